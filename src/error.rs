//! Error types for archive dumping

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while dumping an archive.
///
/// Only [`DumpError::XmlParse`] is absorbed inside the pipeline; every other
/// variant aborts the run.
#[derive(Error, Debug)]
pub enum DumpError {
    /// The path does not resolve to a readable zip container.
    #[error("cannot open archive '{}': {source}", path.display())]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An archive member is not well-formed XML.
    #[error("XML parse routine raised error '{0}'")]
    XmlParse(String),

    /// The container could not locate or decode the header of an entry.
    #[error("cannot read archive entry #{index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },

    /// Reading an entry's bytes failed, e.g. corrupted compressed data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DumpError {
    /// Whether this error is recovered locally by falling back to the raw bytes.
    pub fn is_xml_parse(&self) -> bool {
        matches!(self, DumpError::XmlParse(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DumpError>;
