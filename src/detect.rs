//! Content classification
//!
//! Decides whether a member's bytes are binary, UTF-8 text, or something
//! else by scanning a bounded prefix of the stream:
//!
//! 1. A chunk containing a NUL byte → [`Classification::Binary`]
//! 2. A chunk that is not valid UTF-8 → [`Classification::Unknown`]
//! 3. Stream (or scan budget) exhausted → [`Classification::Text`]

use std::fmt;
use std::io::{self, Read};

use crate::archive::RewindableStream;

/// Size of each read while scanning.
pub const CHUNK_SIZE: usize = 8192;

/// Longest UTF-8 sequence tail that can be left over after a chunk boundary.
const MAX_UTF8_CARRY: usize = 3;

/// How far into a stream the classifier looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Thoroughness {
    /// First 800 bytes
    Abide,
    /// First 8000 bytes, like `git diff`
    #[default]
    Mellow,
    /// The whole stream
    Strict,
}

impl Thoroughness {
    /// Number of bytes to scan, `None` meaning no limit.
    pub fn budget(self) -> Option<usize> {
        match self {
            Thoroughness::Abide => Some(800),
            Thoroughness::Mellow => Some(8000),
            Thoroughness::Strict => None,
        }
    }
}

/// Result of classifying a member's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Binary,
    /// Valid UTF-8 as far as the scan went
    Text,
    /// Neither binary nor UTF-8
    Unknown,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Binary => "binary",
            Classification::Text => "text",
            Classification::Unknown => "unknown",
        }
    }

    pub fn is_text(self) -> bool {
        self == Classification::Text
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewind `stream` and classify its content.
///
/// Decoding problems are a classification outcome; only I/O failures are
/// returned as errors.
pub fn classify(stream: &mut dyn RewindableStream, thoroughness: Thoroughness) -> io::Result<Classification> {
    let mut reader = stream.rewind()?;
    classify_reader(&mut *reader, thoroughness)
}

/// Classify bytes read from `reader`, which is consumed up to the scan's end.
pub fn classify_reader(reader: &mut dyn Read, thoroughness: Thoroughness) -> io::Result<Classification> {
    let mut remaining = thoroughness.budget();
    let mut chunk = vec![0u8; CHUNK_SIZE + MAX_UTF8_CARRY];
    // Bytes of a UTF-8 sequence split by the previous chunk boundary,
    // already checked for NUL and kept at the front of `chunk`.
    let mut carry = 0usize;

    loop {
        let want = match remaining {
            Some(0) => return Ok(Classification::Text),
            Some(left) => left.min(CHUNK_SIZE),
            None => CHUNK_SIZE,
        };

        let read = read_full(reader, &mut chunk[carry..carry + want])?;
        if read == 0 {
            break;
        }
        if let Some(left) = remaining.as_mut() {
            *left -= read;
        }

        let window = &chunk[carry..carry + read];
        if memchr::memchr(0, window).is_some() {
            return Ok(Classification::Binary);
        }

        let window = &chunk[..carry + read];
        match std::str::from_utf8(window) {
            Ok(_) => carry = 0,
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let end = window.len();
                chunk.copy_within(valid..end, 0);
                carry = end - valid;
            }
            Err(_) => return Ok(Classification::Unknown),
        }
    }

    // The stream ended in the middle of a multi-byte sequence.
    if carry > 0 {
        return Ok(Classification::Unknown);
    }
    Ok(Classification::Text)
}

/// Fill `buf` as far as the reader allows, returning the byte count.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
