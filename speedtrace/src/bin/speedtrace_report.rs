//! Summarize a timeline record dump as JSON.
//!
//! This binary reads a record dump (newline-delimited JSON, optionally
//! gzip-compressed), runs it through a session and writes a report with
//! per-event breakdowns, network resources and JavaScript profiles.
//!
//! # Usage
//!
//! ```bash
//! speedtrace_report session.ndjson
//! speedtrace_report session.ndjson.gz --config speedtrace.toml -o report.json
//! RUST_LOG=speedtrace=debug speedtrace_report session.ndjson --pixels-per-ms 0.5
//! ```

use clap::Parser;
use flate2::read::GzDecoder;
use speedtrace::report::SessionReport;
use speedtrace::{Config, Session};
use speedtrace_model::RecordDump;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Parser, Debug)]
#[command(name = "speedtrace_report")]
#[command(about = "Summarize a timeline record dump as JSON")]
#[command(version)]
struct Args {
    /// Input record dump (.ndjson, or .ndjson.gz)
    input: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rendering scale for dominant-type and fold decisions (overrides config)
    #[arg(long)]
    pixels_per_ms: Option<f64>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

/// Opens `path`, transparently decompressing gzip input.
fn open_dump(path: &Path) -> Result<Box<dyn Read>, Box<dyn std::error::Error>> {
    let file = File::open(path)
        .map_err(|e| format!("Failed to open input file '{}': {}", path.display(), e))?;
    let mut reader = BufReader::new(file);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(pixels_per_ms) = args.pixels_per_ms {
        if !(pixels_per_ms.is_finite() && pixels_per_ms > 0.0) {
            return Err(format!("--pixels-per-ms must be positive, got {}", pixels_per_ms).into());
        }
        config.pixels_per_ms = pixels_per_ms;
    }

    let dump = RecordDump::parse(open_dump(&args.input)?)?;
    tracing::info!(records = dump.records.len(), input = %args.input.display(), "read record dump");

    let pixels_per_ms = config.pixels_per_ms;
    let mut session = Session::new(config);
    session.ingest_all(dump.records);
    session.finish();

    let report = SessionReport::build(&session, pixels_per_ms);
    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).map_err(|e| {
            format!("Failed to create output file '{}': {}", path.display(), e)
        })?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    if args.pretty {
        serde_json::to_writer_pretty(&mut writer, &report)?;
    } else {
        serde_json::to_writer(&mut writer, &report)?;
    }
    writeln!(writer)?;
    writer.flush()?;

    let stats = session.stats();
    eprintln!(
        "Processed {} records: {} events, {} resources, {} profiles",
        stats.records,
        stats.events,
        session.network().len(),
        session.profiles().len()
    );

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
