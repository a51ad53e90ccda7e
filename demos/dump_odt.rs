//! Example of dumping a small OpenDocument-like archive
//!
//! The archive is built in memory with a stored `mimetype`, a messy
//! `content.xml` and a binary thumbnail, then dumped twice: once with all
//! metadata and once without dates, as a diff filter would.

use std::io::{Cursor, Write};

use odfdump::{tidy_xml, Dumper, MetadataItem};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn main() -> anyhow::Result<()> {
    println!("=== OpenDocument Dump Example ===\n");

    let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content office:version="1.2" xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body>
      <office:text><text:p>Hello <text:span>diff</text:span> world</text:p></office:text></office:body></office:document-content>"#;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("mimetype", SimpleFileOptions::default().compression_method(CompressionMethod::Stored))?;
    writer.write_all(b"application/vnd.oasis.opendocument.text")?;
    writer.start_file("content.xml", SimpleFileOptions::default())?;
    writer.write_all(content.as_bytes())?;
    writer.start_file("Thumbnails/thumbnail.png", SimpleFileOptions::default())?;
    writer.write_all(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00])?;
    let archive = writer.finish()?.into_inner();

    println!("Tidied content.xml:");
    println!("---");
    print!("{}", String::from_utf8_lossy(&tidy_xml(content.as_bytes())?));
    println!("---\n");

    println!("Full dump:");
    for line in Dumper::new().dump_reader(Cursor::new(archive.clone()))? {
        println!("{}", line?);
    }

    println!("\nDump without dates:");
    let dumper = Dumper::new().without_items(&[MetadataItem::DateTime]);
    for line in dumper.dump_reader(Cursor::new(archive))? {
        println!("{}", line?);
    }

    Ok(())
}
