//! Archive entries and the byte streams behind them

use std::fmt;
use std::io::{self, Read, Seek};

use zip::ZipArchive;

/// Last-modified time of an archive entry, as stored by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self { year, month, day, hour, minute, second }
    }

    /// Convert the container's time for entry `name`, falling back to the zip
    /// epoch when it is missing or out of range.
    pub fn from_zip_or_default(dt: Option<zip::DateTime>, name: &str) -> Self {
        match dt {
            Some(dt) => dt.into(),
            None => {
                tracing::debug!("Member '{}' has no usable timestamp; using {}", name, Self::default());
                Self::default()
            }
        }
    }
}

impl Default for Timestamp {
    /// The zip epoch, used for entries that carry no usable timestamp.
    fn default() -> Self {
        Self::new(1980, 1, 1, 0, 0, 0)
    }
}

impl From<zip::DateTime> for Timestamp {
    fn from(dt: zip::DateTime) -> Self {
        Self::new(dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute(), dt.second())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Descriptive information about one archive member.
///
/// Built from the container's central directory; the dumping pipeline only
/// ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveEntry {
    /// Name of the member (may include subdirectories)
    pub name: String,
    /// Declared uncompressed size
    pub size: u64,
    pub timestamp: Timestamp,
    /// CRC-32 as recorded by the container
    pub crc32: u32,
    pub comment: String,
    pub extra: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Self::default()
        }
    }

    /// Read the header of entry `index` from a zip container.
    pub fn from_zip<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        index: usize,
    ) -> zip::result::ZipResult<Self> {
        let file = archive.by_index(index)?;
        Ok(Self {
            name: file.name().to_string(),
            size: file.size(),
            timestamp: Timestamp::from_zip_or_default(file.last_modified(), file.name()),
            crc32: file.crc32(),
            comment: file.comment().to_string(),
            extra: file.extra_data().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }
}

/// A byte source that can only be read sequentially from its start.
///
/// Every call to [`rewind`](RewindableStream::rewind) hands out a fresh reader
/// positioned at the first byte; the previous reader must be dropped first,
/// which the borrow on `self` enforces. There is no arbitrary seek:
/// compressed members only support reopening.
pub trait RewindableStream {
    fn rewind(&mut self) -> io::Result<Box<dyn Read + '_>>;
}

/// An entry of a zip container, reopened from the start on every rewind.
pub struct ZipMember<'a, R> {
    archive: &'a mut ZipArchive<R>,
    index: usize,
}

impl<'a, R: Read + Seek> ZipMember<'a, R> {
    pub fn new(archive: &'a mut ZipArchive<R>, index: usize) -> Self {
        Self { archive, index }
    }
}

impl<R: Read + Seek> RewindableStream for ZipMember<'_, R> {
    fn rewind(&mut self) -> io::Result<Box<dyn Read + '_>> {
        let file = self.archive.by_index(self.index).map_err(io::Error::other)?;
        Ok(Box::new(file))
    }
}

/// In-memory bytes, e.g. a tidied XML document standing in for its member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStream {
    data: Vec<u8>,
}

impl MemoryStream {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl RewindableStream for MemoryStream {
    fn rewind(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.data.as_slice()))
    }
}
