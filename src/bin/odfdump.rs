//! odfdump CLI
//!
//! Print a line-oriented dump of an OpenDocument file or zip archive, e.g.
//! for use as a `git diff` textconv filter.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use odfdump::{DumpError, Dumper, MetadataItem};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "odfdump")]
#[command(version)]
#[command(about = "Creates textual dumps of OpenDocument Format files and other zip archives")]
struct Cli {
    /// Document or archive to dump
    filename: PathBuf,

    /// Do not dump the date of each archive member
    #[arg(short = 'D', long = "no-dump-date")]
    no_dump_date: bool,

    /// Do not dump this metadata field (repeatable)
    #[arg(long = "no-dump", value_name = "FIELD")]
    no_dump: Vec<Field>,

    /// Log debug details to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Metadata fields that may be left out of the dump
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    #[value(name = "date_time")]
    DateTime,
    #[value(name = "comment")]
    Comment,
    #[value(name = "extra")]
    Extra,
    #[value(name = "file_size")]
    FileSize,
    #[value(name = "CRC")]
    Crc,
}

impl From<Field> for MetadataItem {
    fn from(field: Field) -> Self {
        match field {
            Field::DateTime => MetadataItem::DateTime,
            Field::Comment => MetadataItem::Comment,
            Field::Extra => MetadataItem::Extra,
            Field::FileSize => MetadataItem::FileSize,
            Field::Crc => MetadataItem::Crc,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut skipped: Vec<MetadataItem> = cli.no_dump.iter().copied().map(MetadataItem::from).collect();
    if cli.no_dump_date {
        skipped.push(MetadataItem::DateTime);
    }

    let dumper = Dumper::new().without_items(&skipped);
    let stdout = io::stdout().lock();

    match dumper.write_archive(&cli.filename, io::BufWriter::new(stdout)) {
        Ok(()) => Ok(()),
        // The reader went away (e.g. `| head`); nothing left to do.
        Err(DumpError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to dump: {}", cli.filename.display())),
    }
}
