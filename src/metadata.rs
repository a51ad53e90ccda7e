//! Descriptive metadata for archive members

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use sha1::{Digest, Sha1};

use crate::archive::{ArchiveEntry, RewindableStream};

/// Read size used while hashing a member.
pub const HASH_CHUNK_SIZE: usize = 1 << 20;

/// Entry attributes that can be dumped, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataItem {
    DateTime,
    Comment,
    Extra,
    FileSize,
    Crc,
}

impl MetadataItem {
    /// All items, in the order they are dumped.
    pub const ALL: [MetadataItem; 5] = [
        MetadataItem::DateTime,
        MetadataItem::Comment,
        MetadataItem::Extra,
        MetadataItem::FileSize,
        MetadataItem::Crc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetadataItem::DateTime => "date_time",
            MetadataItem::Comment => "comment",
            MetadataItem::Extra => "extra",
            MetadataItem::FileSize => "file_size",
            MetadataItem::Crc => "CRC",
        }
    }

    /// Items dropped entirely when their value is empty.
    fn dropped_when_empty(self) -> bool {
        matches!(self, MetadataItem::Comment | MetadataItem::Extra)
    }

    fn value(self, entry: &ArchiveEntry) -> String {
        match self {
            MetadataItem::DateTime => entry.timestamp.to_string(),
            MetadataItem::Comment => entry.comment.clone(),
            MetadataItem::Extra => hex::encode(&entry.extra),
            MetadataItem::FileSize => entry.size.to_string(),
            MetadataItem::Crc => entry.crc32.to_string(),
        }
    }
}

impl fmt::Display for MetadataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetadataItem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetadataItem::ALL
            .into_iter()
            .find(|item| item.name() == s)
            .ok_or_else(|| format!("unknown metadata field '{}'", s))
    }
}

/// A `(name, value)` pair describing a member. The value may span lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Computes a content checksum by streaming a member.
pub trait ContentHasher {
    /// Field name identifying the algorithm
    fn name(&self) -> &str;

    /// Rewind `stream` and hash it to exhaustion, returning a hex digest.
    fn digest(&self, stream: &mut dyn RewindableStream) -> io::Result<String>;
}

/// SHA-1, read in 1 MiB chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Hasher;

impl ContentHasher for Sha1Hasher {
    fn name(&self) -> &str {
        "sha1"
    }

    fn digest(&self, stream: &mut dyn RewindableStream) -> io::Result<String> {
        let mut reader = stream.rewind()?;
        let mut hasher = Sha1::new();
        let mut chunk = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => hasher.update(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Produces the metadata fields of a member.
pub struct MetadataCollector {
    items: Vec<MetadataItem>,
    hasher: Box<dyn ContentHasher>,
}

impl MetadataCollector {
    /// Collect every item, with a SHA-1 checksum
    pub fn new() -> Self {
        Self {
            items: MetadataItem::ALL.to_vec(),
            hasher: Box::new(Sha1Hasher),
        }
    }

    /// Restrict the dumped items. Order always follows [`MetadataItem::ALL`].
    pub fn with_items(mut self, items: &[MetadataItem]) -> Self {
        self.items = MetadataItem::ALL
            .into_iter()
            .filter(|item| items.contains(item))
            .collect();
        self
    }

    pub fn with_hasher(mut self, hasher: Box<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Descriptive fields taken from the entry header, without the checksum.
    pub fn descriptive_fields<'a>(&'a self, entry: &'a ArchiveEntry) -> impl Iterator<Item = MetadataField> + 'a {
        self.items.iter().filter_map(move |&item| {
            let value = item.value(entry);
            if value.is_empty() && item.dropped_when_empty() {
                None
            } else {
                Some(MetadataField::new(item.name(), value))
            }
        })
    }

    /// Checksum field computed over the whole member.
    pub fn checksum(&self, stream: &mut dyn RewindableStream) -> io::Result<MetadataField> {
        let digest = self.hasher.digest(stream)?;
        Ok(MetadataField::new(self.hasher.name(), digest))
    }

    /// All fields of a member: descriptive fields, then the checksum.
    pub fn collect(&self, entry: &ArchiveEntry, stream: &mut dyn RewindableStream) -> io::Result<Vec<MetadataField>> {
        let checksum = self.checksum(stream)?;
        Ok(self.descriptive_fields(entry).chain(Some(checksum)).collect())
    }
}

impl Default for MetadataCollector {
    fn default() -> Self {
        Self::new()
    }
}
