//! # odfdump
//!
//! Diff-friendly textual dumps of OpenDocument files, or of any zip archive.
//!
//! Every member of the archive becomes a block of lines:
//!
//! ```text
//! content.xml:  date_time: 2011-03-07T09:05:02
//! content.xml:  file_size: 3342
//! content.xml:  CRC: 2213197642
//! content.xml:  sha1: 4e6d465b4be750e94bc88480fe95e21a18b46819
//! content.xml:  filetype: text
//! content.xml:: <?xml version="1.0" encoding="UTF-8"?>
//! content.xml:: <office:document-content office:version="1.2">
//! ...
//! ```
//!
//! Header lines (`name:  field: value`) describe the member; content lines
//! (`name:: line`) follow only when the member is UTF-8 text. XML members are
//! tidied into one canonical layout first, so that line-level differences
//! between two dumps reflect changes in content rather than formatting.
//!
//! ## Classification
//!
//! Members are classified by scanning a bounded prefix (see [`Thoroughness`]):
//! 1. Contains a NUL byte → `binary`
//! 2. Not valid UTF-8 → `unknown`
//! 3. Otherwise → `text`
//!
//! ## Example
//!
//! ```rust,no_run
//! use odfdump::{Dumper, MetadataItem};
//!
//! let lines = Dumper::new()
//!     .without_items(&[MetadataItem::DateTime])
//!     .dump_path("report.odt")?;
//! for line in lines {
//!     println!("{}", line?);
//! }
//! # Ok::<(), odfdump::DumpError>(())
//! ```

pub mod archive;
pub mod detect;
pub mod dumper;
pub mod error;
pub mod format;
pub mod metadata;
pub mod xml;

pub use archive::{ArchiveEntry, MemoryStream, RewindableStream, Timestamp, ZipMember};
pub use detect::{classify, Classification, Thoroughness};
pub use dumper::{dump, Diagnostics, DumpLines, Dumper, TracingDiagnostics};
pub use error::{DumpError, Result};
pub use format::{format_content, format_header, format_metadata};
pub use metadata::{ContentHasher, MetadataCollector, MetadataField, MetadataItem, Sha1Hasher};
pub use xml::{tidy_xml, PrettyXml, XmlNormalizer};
