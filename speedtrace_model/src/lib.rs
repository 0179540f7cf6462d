//! Timeline record model for browser performance traces.
//!
//! This library holds the data model shared by the trace pipeline: the
//! event type taxonomy, the custom type registry, hint records, the
//! arena-backed event tree, and the raw records read from a record dump.
//!
//! A record dump is newline-delimited JSON. Each line is one record with a
//! `kind` discriminant (`event`, `resourceStart`, `resourceResponse`,
//! `resourceData`, `resourceUpdate`, `resourceFinish`, `profile`, `hint`).
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use speedtrace_model::RecordDump;
//!
//! let file = File::open("session.ndjson").unwrap();
//! let dump = RecordDump::parse(file).unwrap();
//!
//! println!("Records: {}", dump.records.len());
//! ```

pub mod event_type;
pub mod hint;
pub mod raw;
pub mod registry;
pub mod tree;

pub use event_type::EventType;
pub use hint::{HintRecord, Severity};
pub use raw::{
    ProfileRecord, RawEvent, RawRecord, RawType, ResourceData, ResourceFinish, ResourceResponse,
    ResourceStart, ResourceUpdate,
};
pub use registry::EventTypeRegistry;
pub use tree::{EventTree, NodeId, PendingEvent, TypeDurations, UiEvent};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;

/// Errors that can occur while reading a record dump.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown record kind '{0}' at line {1}")]
    UnknownRecordKind(String, usize),
}

/// Result type for record dump parsing.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Discriminant read before the full record.
#[derive(Debug, Deserialize)]
struct RecordKind {
    kind: String,
}

fn parse_line<T: DeserializeOwned>(line: &str, line_num: usize) -> Result<T> {
    serde_json::from_str(line).map_err(|e| ParseError::Json {
        line: line_num,
        source: e,
    })
}

/// Parses one dump line into a record.
pub fn parse_record(line: &str, line_num: usize) -> Result<RawRecord> {
    let raw: RecordKind = parse_line(line, line_num)?;
    let record = match raw.kind.as_str() {
        "event" => RawRecord::Event(parse_line(line, line_num)?),
        "resourceStart" => RawRecord::ResourceStart(parse_line(line, line_num)?),
        "resourceResponse" => RawRecord::ResourceResponse(parse_line(line, line_num)?),
        "resourceData" => RawRecord::ResourceData(parse_line(line, line_num)?),
        "resourceUpdate" => RawRecord::ResourceUpdate(parse_line(line, line_num)?),
        "resourceFinish" => RawRecord::ResourceFinish(parse_line(line, line_num)?),
        "profile" => RawRecord::Profile(parse_line(line, line_num)?),
        "hint" => RawRecord::Hint(parse_line(line, line_num)?),
        other => return Err(ParseError::UnknownRecordKind(other.to_string(), line_num)),
    };
    Ok(record)
}

/// A parsed record dump, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RecordDump {
    pub records: Vec<RawRecord>,
}

impl RecordDump {
    /// Parse a record dump from any `Read`-able source.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let buf_reader = BufReader::new(reader);
        let mut records = Vec::new();

        for (line_num, line_result) in buf_reader.lines().enumerate() {
            let line_num = line_num + 1;
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_record(&line, line_num)?);
        }

        Ok(Self { records })
    }

    /// Number of records per `kind`.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.kind()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_mixed_dump() {
        let data = r#"{"kind":"resourceStart","identifier":1,"startTime":5.0,"url":"http://example.com/"}

{"kind":"event","type":"Layout","startTime":10,"duration":100,"children":[{"type":"ParseHTML","startTime":11,"duration":9}]}
{"kind":"profile","format":"v8","profileData":"tick,0x100,+1,0\n"}
{"kind":"hint","hintletRule":"Long duration events","severity":1,"refRecord":1}
"#;
        let dump = RecordDump::parse(Cursor::new(data)).unwrap();
        assert_eq!(dump.records.len(), 4);

        match &dump.records[1] {
            RawRecord::Event(event) => {
                assert_eq!(event.raw_type, RawType::Name("Layout".to_string()));
                assert_eq!(event.start_time, 10.0);
                assert_eq!(event.duration, Some(100.0));
                assert_eq!(event.children.len(), 1);
                assert_eq!(event.children[0].type_name_str(), Some("ParseHTML"));
            }
            other => panic!("expected event, got {:?}", other),
        }

        match &dump.records[0] {
            RawRecord::ResourceStart(start) => {
                assert_eq!(start.http_method, "GET");
                assert!(!start.is_main_resource);
            }
            other => panic!("expected resource start, got {:?}", other),
        }

        let counts = dump.counts();
        assert_eq!(counts["event"], 1);
        assert_eq!(counts["profile"], 1);
        assert_eq!(counts.get("resourceFinish"), None);
    }

    #[test]
    fn numeric_type_codes() {
        let line = r#"{"kind":"event","type":3,"startTime":1.5}"#;
        match parse_record(line, 1).unwrap() {
            RawRecord::Event(event) => {
                assert_eq!(event.raw_type, RawType::Code(3));
                assert!(event.children.is_empty());
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn unknown_kind_fails() {
        let data = r#"{"kind":"event","type":"Paint","startTime":1}
{"kind":"mystery"}"#;
        let result = RecordDump::parse(Cursor::new(data));
        assert!(matches!(
            result,
            Err(ParseError::UnknownRecordKind(ref kind, 2)) if kind == "mystery"
        ));
    }

    #[test]
    fn malformed_json_reports_line() {
        let data = "{\"kind\":\"event\",\"type\":\"Paint\",\"startTime\":1}\n{not json";
        let result = RecordDump::parse(Cursor::new(data));
        assert!(matches!(result, Err(ParseError::Json { line: 2, .. })));
    }

    #[test]
    fn missing_required_field_fails() {
        let line = r#"{"kind":"resourceFinish","startTime":3}"#;
        assert!(matches!(
            parse_record(line, 9),
            Err(ParseError::Json { line: 9, .. })
        ));
    }
}
