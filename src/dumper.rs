//! Dumping of archive members and whole archives

use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader, Read, Seek, Write};
use std::path::Path;
use std::rc::Rc;

use zip::ZipArchive;

use crate::archive::{ArchiveEntry, MemoryStream, RewindableStream, ZipMember};
use crate::detect::{classify, Thoroughness};
use crate::error::{DumpError, Result};
use crate::format::{format_content, format_header, format_metadata, join_lines};
use crate::metadata::{ContentHasher, MetadataCollector, MetadataItem};
use crate::xml::{is_xml, PrettyXml, XmlNormalizer};

/// Receives problems that are recovered from while dumping.
pub trait Diagnostics {
    /// An XML member could not be tidied and is dumped as-is.
    fn xml_tidy_failed(&self, entry: &str, error: &DumpError);
}

/// Reports recovered problems as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn xml_tidy_failed(&self, entry: &str, error: &DumpError) {
        tracing::warn!(
            member = entry,
            "Error parsing XML in member '{}': {}; XML tidying aborted.",
            entry,
            error
        );
    }
}

/// Produces dump lines for archive members.
pub struct Dumper {
    metadata: MetadataCollector,
    normalizer: Box<dyn XmlNormalizer>,
    thoroughness: Thoroughness,
    diagnostics: Rc<dyn Diagnostics>,
}

impl Dumper {
    /// Create a dumper with every metadata item, SHA-1 checksums and XML tidying
    pub fn new() -> Self {
        Self {
            metadata: MetadataCollector::new(),
            normalizer: Box::new(PrettyXml::new()),
            thoroughness: Thoroughness::default(),
            diagnostics: Rc::new(TracingDiagnostics),
        }
    }

    /// Dump only these metadata items
    pub fn with_items(mut self, items: &[MetadataItem]) -> Self {
        self.metadata = self.metadata.with_items(items);
        self
    }

    /// Dump every metadata item except these
    pub fn without_items(self, skipped: &[MetadataItem]) -> Self {
        let kept: Vec<_> = MetadataItem::ALL
            .into_iter()
            .filter(|item| !skipped.contains(item))
            .collect();
        self.with_items(&kept)
    }

    pub fn with_hasher(mut self, hasher: Box<dyn ContentHasher>) -> Self {
        self.metadata = self.metadata.with_hasher(hasher);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Box<dyn XmlNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_thoroughness(mut self, thoroughness: Thoroughness) -> Self {
        self.thoroughness = thoroughness;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Rc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Dump a single member into a list of lines.
    pub fn dump_member(&self, entry: &ArchiveEntry, source: &mut dyn RewindableStream) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        self.dump_member_into(entry, source, &mut |line: String| -> Result<()> {
            lines.push(line);
            Ok(())
        })?;
        Ok(lines)
    }

    /// Dump a single member, handing each line to `emit` as soon as it exists.
    ///
    /// Lines come out as: metadata headers, the `filetype` header, then one
    /// content line per line of the member when it is text. XML members are
    /// tidied first; if that fails the original bytes are used. An error from
    /// `emit` stops the dump and is returned.
    pub fn dump_member_into(
        &self,
        entry: &ArchiveEntry,
        source: &mut dyn RewindableStream,
        emit: &mut dyn FnMut(String) -> Result<()>,
    ) -> Result<()> {
        let name = join_lines(&entry.name);

        for field in self.metadata.collect(entry, source)? {
            emit(format_header(&name, &format_metadata(&field.name, &field.value)))?;
        }

        let mut tidied = None;
        if is_xml(&entry.name, entry.size) {
            match self.normalizer.normalize(source) {
                Ok(bytes) => tidied = Some(MemoryStream::new(bytes)),
                Err(e) if e.is_xml_parse() => self.diagnostics.xml_tidy_failed(&entry.name, &e),
                Err(e) => return Err(e),
            }
        }
        let active: &mut dyn RewindableStream = match tidied.as_mut() {
            Some(stream) => stream,
            None => source,
        };

        let filetype = classify(active, self.thoroughness)?;
        tracing::debug!(member = %entry.name, %filetype, "classified member");
        emit(format_header(&name, &format_metadata("filetype", filetype.as_str())))?;

        if filetype.is_text() {
            let reader = BufReader::new(active.rewind()?);
            for line in reader.split(b'\n') {
                let line = line?;
                let line = line.strip_suffix(b"\r").unwrap_or(&line);
                emit(format_content(&name, &String::from_utf8_lossy(line)))?;
            }
        }

        Ok(())
    }

    /// Open the zip archive at `path` and dump it lazily.
    pub fn dump_path(self, path: impl AsRef<Path>) -> Result<DumpLines<BufReader<fs::File>>> {
        let archive = open_archive(path.as_ref())?;
        Ok(DumpLines::new(archive, self))
    }

    /// Dump a zip archive read from memory or any seekable source.
    pub fn dump_reader<R: Read + Seek>(self, reader: R) -> Result<DumpLines<R>> {
        let archive = ZipArchive::new(reader).map_err(|source| DumpError::ArchiveOpen {
            path: "<reader>".into(),
            source,
        })?;
        Ok(DumpLines::new(archive, self))
    }

    /// Dump the archive at `path`, writing each line as it is produced.
    ///
    /// Unlike [`DumpLines`] no member is ever held in memory as a whole.
    pub fn write_archive<W: Write>(&self, path: impl AsRef<Path>, mut writer: W) -> Result<()> {
        let mut archive = open_archive(path.as_ref())?;
        let mut write_line = |line: String| -> Result<()> {
            writeln!(writer, "{}", line)?;
            Ok(())
        };

        for index in 0..archive.len() {
            let entry = read_entry(&mut archive, index)?;
            let mut member = ZipMember::new(&mut archive, index);
            self.dump_member_into(&entry, &mut member, &mut write_line)?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<fs::File>>> {
    let open_error = |source: zip::result::ZipError| DumpError::ArchiveOpen { path: path.to_path_buf(), source };

    let file = fs::File::open(path).map_err(|e| open_error(zip::result::ZipError::Io(e)))?;
    let archive = ZipArchive::new(BufReader::new(file)).map_err(open_error)?;
    tracing::debug!(path = %path.display(), entries = archive.len(), "opened archive");
    Ok(archive)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize) -> Result<ArchiveEntry> {
    ArchiveEntry::from_zip(archive, index).map_err(|source| DumpError::Entry { index, source })
}

impl Default for Dumper {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines of an archive dump, produced member by member in container order.
///
/// The archive stays open while the iterator is alive and is closed when it
/// is dropped, whether or not every line was consumed. After an error the
/// iterator is exhausted.
pub struct DumpLines<R> {
    archive: ZipArchive<R>,
    dumper: Dumper,
    next_index: usize,
    pending: VecDeque<String>,
    failed: bool,
}

impl<R: Read + Seek> DumpLines<R> {
    fn new(archive: ZipArchive<R>, dumper: Dumper) -> Self {
        Self {
            archive,
            dumper,
            next_index: 0,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// Number of members in the archive.
    pub fn member_count(&self) -> usize {
        self.archive.len()
    }

    fn dump_next_member(&mut self) -> Result<Vec<String>> {
        let index = self.next_index;
        self.next_index += 1;

        let entry = read_entry(&mut self.archive, index)?;
        let mut member = ZipMember::new(&mut self.archive, index);
        self.dumper.dump_member(&entry, &mut member)
    }
}

impl<R: Read + Seek> Iterator for DumpLines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.failed || self.next_index >= self.archive.len() {
                return None;
            }
            match self.dump_next_member() {
                Ok(lines) => self.pending.extend(lines),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Dump the archive at `path` with default settings.
pub fn dump(path: impl AsRef<Path>) -> Result<DumpLines<BufReader<fs::File>>> {
    Dumper::new().dump_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::{self, Cursor};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[derive(Default)]
    struct RecordedWarnings {
        warnings: RefCell<Vec<String>>,
    }

    impl Diagnostics for RecordedWarnings {
        fn xml_tidy_failed(&self, entry: &str, error: &DumpError) {
            self.warnings.borrow_mut().push(format!("{}: {}", entry, error));
        }
    }

    struct StubNormalizer;

    impl XmlNormalizer for StubNormalizer {
        fn normalize(&self, _stream: &mut dyn RewindableStream) -> Result<Vec<u8>> {
            Ok(b"tidied\n".to_vec())
        }
    }

    struct FixedHasher;

    impl ContentHasher for FixedHasher {
        fn name(&self) -> &str {
            "sha1"
        }

        fn digest(&self, _stream: &mut dyn RewindableStream) -> io::Result<String> {
            Ok("feed".to_string())
        }
    }

    struct FailingStream;

    impl RewindableStream for FailingStream {
        fn rewind(&mut self) -> io::Result<Box<dyn Read + '_>> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "invalid deflate stream"))
        }
    }

    /// Accepts `limit` bytes, then reports the reader as gone.
    struct ClosingWriter {
        written: Vec<u8>,
        limit: usize,
    }

    impl Write for ClosingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() >= self.limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn build_zip(members: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        build_zip_with(zip::CompressionMethod::Deflated, members)
    }

    fn build_zip_with(method: zip::CompressionMethod, members: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        let when = zip::DateTime::from_date_and_time(2020, 2, 29, 23, 59, 58).unwrap();
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(when);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn dump_all(dumper: Dumper, members: &[(&str, &[u8])]) -> Vec<String> {
        dumper
            .dump_reader(build_zip(members))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_dump_member_text() {
        let dumper = Dumper::new().with_hasher(Box::new(FixedHasher));
        let entry = ArchiveEntry::new("notes.txt", 12);
        let mut stream = MemoryStream::new("one\ntwo\r\n\nthree");

        let lines = dumper.dump_member(&entry, &mut stream).unwrap();
        assert_eq!(
            lines,
            vec![
                "notes.txt:  date_time: 1980-01-01T00:00:00",
                "notes.txt:  file_size: 12",
                "notes.txt:  CRC: 0",
                "notes.txt:  sha1: feed",
                "notes.txt:  filetype: text",
                "notes.txt:: one",
                "notes.txt:: two",
                "notes.txt:: ",
                "notes.txt:: three",
            ]
        );
    }

    #[test]
    fn test_dump_member_binary_has_no_content() {
        let dumper = Dumper::new().with_hasher(Box::new(FixedHasher));
        let entry = ArchiveEntry::new("Thumbnails/thumbnail.png", 6);
        let mut stream = MemoryStream::new(b"\x89PNG\0\x1a".to_vec());

        let lines = dumper.dump_member(&entry, &mut stream).unwrap();
        assert_eq!(lines.last().unwrap(), "Thumbnails/thumbnail.png:  filetype: binary");
        assert!(lines.iter().all(|l| !l.contains(":: ")));
    }

    #[test]
    fn test_dump_member_unknown_has_no_content() {
        let dumper = Dumper::new();
        let entry = ArchiveEntry::new("legacy.txt", 5);
        let mut stream = MemoryStream::new(b"caf\xe9!".to_vec());

        let lines = dumper.dump_member(&entry, &mut stream).unwrap();
        assert_eq!(lines.last().unwrap(), "legacy.txt:  filetype: unknown");
    }

    #[test]
    fn test_dump_member_comment_is_single_line() {
        let dumper = Dumper::new().with_hasher(Box::new(FixedHasher));
        let mut entry = ArchiveEntry::new("a.txt", 1);
        entry.comment = "line1\nline2".to_string();

        let lines = dumper.dump_member(&entry, &mut MemoryStream::new("a")).unwrap();
        assert!(lines.contains(&"a.txt:  comment: line1  line2".to_string()));
    }

    #[test]
    fn test_dump_member_uses_normalizer_for_xml() {
        let dumper = Dumper::new().with_normalizer(Box::new(StubNormalizer));
        let entry = ArchiveEntry::new("styles.xml", 40);
        let mut stream = MemoryStream::new("<whatever/>");

        let lines = dumper.dump_member(&entry, &mut stream).unwrap();
        assert_eq!(lines.last().unwrap(), "styles.xml:: tidied");
    }

    #[test]
    fn test_dump_member_skips_tiny_xml() {
        let dumper = Dumper::new().with_normalizer(Box::new(StubNormalizer));
        let entry = ArchiveEntry::new("x.xml", 2);
        let mut stream = MemoryStream::new("ab");

        let lines = dumper.dump_member(&entry, &mut stream).unwrap();
        assert_eq!(lines.last().unwrap(), "x.xml:: ab");
    }

    #[test]
    fn test_dump_member_checksum_is_of_raw_bytes() {
        let dumper = Dumper::new();
        let raw = "<a>\n      <b/>\n</a>";
        let entry = ArchiveEntry::new("doc.xml", raw.len() as u64);
        let mut stream = MemoryStream::new(raw);

        let lines = dumper.dump_member(&entry, &mut stream).unwrap();
        let mut expected = MemoryStream::new(raw);
        let digest = crate::metadata::Sha1Hasher.digest(&mut expected).unwrap();
        assert!(lines.contains(&format!("doc.xml:  sha1: {}", digest)));
        assert!(lines.contains(&"doc.xml::   <b/>".to_string()));
    }

    #[test]
    fn test_malformed_xml_falls_back_to_original() {
        let warnings = Rc::new(RecordedWarnings::default());
        let dumper = Dumper::new()
            .with_hasher(Box::new(FixedHasher))
            .with_diagnostics(warnings.clone());
        let entry = ArchiveEntry::new("content.xml", 10);
        let mut stream = MemoryStream::new("<a><b></a>");

        let lines = dumper.dump_member(&entry, &mut stream).unwrap();
        assert_eq!(lines[lines.len() - 2], "content.xml:  filetype: text");
        assert_eq!(lines.last().unwrap(), "content.xml:: <a><b></a>");

        let recorded = warnings.warnings.borrow();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("content.xml: XML parse routine raised error"));
    }

    #[test]
    fn test_io_error_propagates() {
        let dumper = Dumper::new();
        let entry = ArchiveEntry::new("content.xml", 100);
        let err = dumper.dump_member(&entry, &mut FailingStream).unwrap_err();
        assert!(matches!(err, DumpError::Io(_)));
    }

    #[test]
    fn test_newline_in_member_name_is_collapsed() {
        let dumper = Dumper::new().with_hasher(Box::new(FixedHasher));
        let entry = ArchiveEntry::new("odd\nname", 1);
        let lines = dumper.dump_member(&entry, &mut MemoryStream::new("z")).unwrap();
        assert!(lines.iter().all(|l| l.starts_with("odd  name:")));
    }

    #[test]
    fn test_dump_archive_xml_member() {
        let lines = dump_all(Dumper::new(), &[("doc.xml", b"<a><b/></a>")]);
        assert_eq!(
            lines,
            vec![
                "doc.xml:  date_time: 2020-02-29T23:59:58",
                "doc.xml:  file_size: 11",
                "doc.xml:  CRC: 2213197642",
                "doc.xml:  sha1: 4e6d465b4be750e94bc88480fe95e21a18b46819",
                "doc.xml:  filetype: text",
                "doc.xml:: <a>",
                "doc.xml::   <b/>",
                "doc.xml:: </a>",
            ]
        );
    }

    #[test]
    fn test_dump_archive_bzip2_member() {
        let reader = build_zip_with(zip::CompressionMethod::Bzip2, &[("notes.txt", b"first\nsecond")]);
        let lines = Dumper::new()
            .with_hasher(Box::new(FixedHasher))
            .dump_reader(reader)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            lines[lines.len() - 3..],
            ["notes.txt:  filetype: text", "notes.txt:: first", "notes.txt:: second"]
        );
    }

    #[test]
    fn test_dump_archive_binary_member() {
        let mut data = vec![b'P'; 100];
        data[42] = 0;
        let lines = dump_all(Dumper::new(), &[("Pictures/1.png", &data)]);
        assert_eq!(lines.last().unwrap(), "Pictures/1.png:  filetype: binary");
        assert!(lines.iter().all(|l| l.starts_with("Pictures/1.png:  ")));
    }

    #[test]
    fn test_dump_archive_keeps_container_order() {
        let lines = dump_all(
            Dumper::new(),
            &[("mimetype", b"application/vnd.oasis.opendocument.text"), ("b.txt", b"b"), ("a.txt", b"a")],
        );
        let order: Vec<&str> = lines
            .iter()
            .filter(|l| l.contains("filetype:"))
            .map(|l| l.split(':').next().unwrap())
            .collect();
        assert_eq!(order, vec!["mimetype", "b.txt", "a.txt"]);
        assert_eq!(lines.last().unwrap(), "a.txt:: a");
    }

    #[test]
    fn test_suppressed_date_time() {
        let lines = dump_all(
            Dumper::new().without_items(&[MetadataItem::DateTime]),
            &[("one.txt", b"1"), ("two.bin", b"\0")],
        );
        assert!(lines.iter().all(|l| !l.contains("date_time")));
        assert_eq!(lines.iter().filter(|l| l.contains("sha1: ")).count(), 2);
        assert_eq!(lines.iter().filter(|l| l.contains("filetype: ")).count(), 2);
        assert_eq!(lines.iter().filter(|l| l.contains("file_size: ")).count(), 2);
    }

    #[test]
    fn test_stop_early() {
        let mut lines = Dumper::new()
            .dump_reader(build_zip(&[("a.txt", b"a\nb\nc"), ("b.txt", b"d")]))
            .unwrap();
        assert_eq!(lines.member_count(), 2);
        let first = lines.next().unwrap().unwrap();
        assert!(first.starts_with("a.txt:  date_time"));
        drop(lines);
    }

    #[test]
    fn test_emit_error_stops_member() {
        let dumper = Dumper::new().with_hasher(Box::new(FixedHasher));
        let entry = ArchiveEntry::new("long.txt", 20);
        let mut stream = MemoryStream::new("1\n2\n3\n4\n5\n6\n7\n8\n9\n10");

        let mut seen = Vec::new();
        let err = dumper
            .dump_member_into(&entry, &mut stream, &mut |line: String| -> Result<()> {
                if line.starts_with("long.txt:: 3") {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed").into());
                }
                seen.push(line);
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, DumpError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(seen.last().unwrap(), "long.txt:: 2");
        assert_eq!(seen.iter().filter(|l| l.contains(":: ")).count(), 2);
    }

    #[test]
    fn test_write_archive_streams_until_writer_closes() {
        let body: String = (0..2000).map(|i| format!("line {}\n", i)).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.zip");
        fs::write(&path, build_zip(&[("big.txt", body.as_bytes()), ("after.txt", b"x")]).into_inner()).unwrap();

        let mut out = ClosingWriter { written: Vec::new(), limit: 512 };
        let err = Dumper::new().write_archive(&path, &mut out).unwrap_err();
        assert!(matches!(err, DumpError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));

        let written = String::from_utf8(out.written).unwrap();
        assert!(written.contains("big.txt:: line 0\n"));
        assert!(!written.contains("line 1999"));
        assert!(!written.contains("after.txt"));
    }

    #[test]
    fn test_not_a_zip() {
        let err = Dumper::new().dump_reader(Cursor::new(b"not a zip".to_vec())).err().unwrap();
        assert!(matches!(err, DumpError::ArchiveOpen { .. }));
    }

    #[test]
    fn test_dump_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = dump(dir.path().join("missing.odt")).err().unwrap();
        assert!(matches!(err, DumpError::ArchiveOpen { .. }));
        assert!(err.to_string().contains("missing.odt"));
    }

    #[test]
    fn test_write_archive_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document.odt");
        fs::write(&path, build_zip(&[("mimetype", b"application/vnd.oasis.opendocument.text")]).into_inner()).unwrap();

        let mut out = Vec::new();
        Dumper::new().write_archive(&path, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.ends_with("mimetype:: application/vnd.oasis.opendocument.text\n"));
        assert_eq!(out.lines().count(), 6);
    }
}
