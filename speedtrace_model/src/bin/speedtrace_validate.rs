//! Check record dumps line by line.
//!
//! Unlike `RecordDump::parse`, which stops at the first bad line, this
//! reports every line that fails to parse and then prints a count of the
//! valid records per kind.

use speedtrace_model::{ParseError, RecordDump, parse_record};
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::ExitCode;

/// Bad lines printed per file before the rest are only counted.
const MAX_REPORTED: usize = 20;

fn check(path: &str) -> Result<(RecordDump, Vec<ParseError>), std::io::Error> {
    let reader = BufReader::new(File::open(path)?);
    let mut dump = RecordDump::default();
    let mut errors = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(&line, index + 1) {
            Ok(record) => dump.records.push(record),
            Err(e) => errors.push(e),
        }
    }
    Ok((dump, errors))
}

fn main() -> ExitCode {
    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("Usage: speedtrace_validate <records.ndjson>...");
        return ExitCode::from(2);
    }

    let mut failed = false;
    for path in &paths {
        let (dump, errors) = match check(path) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Error reading '{}': {}", path, e);
                failed = true;
                continue;
            }
        };

        if errors.is_empty() {
            println!("Valid record dump: {}", path);
        } else {
            failed = true;
            println!("Invalid record dump: {} ({} bad lines)", path, errors.len());
            for error in errors.iter().take(MAX_REPORTED) {
                println!("  {}", error);
            }
            if errors.len() > MAX_REPORTED {
                println!("  ... {} more", errors.len() - MAX_REPORTED);
            }
        }
        println!("  Records: {}", dump.records.len());
        for (kind, count) in dump.counts() {
            println!("    {}: {}", kind, count);
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
