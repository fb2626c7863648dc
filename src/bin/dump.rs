//! AtlasJournal Dump Tool
//!
//! Lists the records of a journal directory without modifying it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use atlasjournal::recovery::{scan_data_file, scan_data_file_with, ScanResult};
use atlasjournal::{DataFile, DataFileAccessor, DataFileSet, InflightWrites, Location};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasJournal dump tool
#[derive(Parser, Debug)]
#[command(name = "atlasjournal-dump")]
#[command(about = "Inspect the data files of an AtlasJournal directory")]
#[command(version)]
struct Args {
    /// Journal directory
    #[arg(short, long, default_value = "./atlasjournal_data")]
    directory: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every record
    List {
        /// Only list records of this data file
        #[arg(short, long)]
        file: Option<i32>,

        /// Print each payload (lossy UTF-8)
        #[arg(short, long)]
        payload: bool,
    },

    /// Check every data file for a torn tail
    Verify,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,atlasjournal=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(clean) if clean => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every scanned data file was intact
fn run(args: Args) -> atlasjournal::Result<bool> {
    if !args.directory.is_dir() {
        return Err(atlasjournal::JournalError::Config(format!(
            "{} is not a directory",
            args.directory.display()
        )));
    }

    let files = DataFileSet::discover(&args.directory, 1, 1)?;
    let inflight = Arc::new(InflightWrites::new());
    let mut clean = true;

    match args.command {
        Commands::List { file, payload } => {
            for data_file in files.all() {
                if file.is_some_and(|id| id != data_file.id()) {
                    continue;
                }
                let mut accessor = DataFileAccessor::open(Arc::clone(&data_file), Arc::clone(&inflight))?;
                let scan = list_records(&mut accessor, payload)?;
                clean &= report(&data_file, &scan);
            }
        }
        Commands::Verify => {
            for data_file in files.all() {
                let mut accessor = DataFileAccessor::open(Arc::clone(&data_file), Arc::clone(&inflight))?;
                let scan = scan_data_file(&mut accessor)?;
                if let Err(e) = scan.ensure_intact(data_file.id()) {
                    tracing::warn!(path = %data_file.path().display(), "{}", e);
                }
                clean &= report(&data_file, &scan);
            }
        }
    }

    Ok(clean)
}

fn list_records(accessor: &mut DataFileAccessor, payload: bool) -> atlasjournal::Result<ScanResult> {
    let mut locations: Vec<Location> = Vec::new();
    let scan = scan_data_file_with(accessor, |location| locations.push(*location))?;

    for mut location in locations {
        let size = location.size().unwrap_or_default();
        let record_type = location.record_type().unwrap_or_default();
        if payload {
            let data = accessor.read_record(&mut location)?;
            println!(
                "file={} offset={} size={} type={} payload={}",
                location.data_file_id(),
                location.offset(),
                size,
                record_type,
                String::from_utf8_lossy(&data)
            );
        } else {
            println!(
                "file={} offset={} size={} type={}",
                location.data_file_id(),
                location.offset(),
                size,
                record_type
            );
        }
    }

    Ok(scan)
}

fn report(data_file: &DataFile, scan: &ScanResult) -> bool {
    if scan.is_torn() {
        println!(
            "{}: {} records, torn tail of {} bytes at offset {}",
            data_file.path().display(),
            scan.records,
            scan.torn_bytes(),
            scan.valid_length
        );
        false
    } else {
        println!("{}: {} records, {} bytes", data_file.path().display(), scan.records, scan.file_length);
        true
    }
}
