//! Browser timeline trace pipeline.
//!
//! This crate turns a stream of raw timeline records into an analyzable
//! session: a tree of UI events with self time and per-type breakdowns,
//! a table of network resources, and JavaScript CPU profiles rebuilt from
//! V8 tick logs.
//!
//! # Modules
//!
//! - [`normalize`] - Translate raw events into ms-relative, typed events
//! - [`aggregate`] - Self time and per-type durations over event subtrees
//! - [`dominant`] - Dominant-type queries and folding of tiny events
//! - [`network`] - Network resource lifecycle
//! - [`v8`] - V8 log decompression, symbol table and tick parsing
//! - [`profile`] - Bottom-up, top-down and flat profile trees
//! - [`session`] - Ingest ordering, sequencing and dispatch
//! - [`report`] - Serializable summary of a finished session
//!
//! # Example
//!
//! ```no_run
//! use speedtrace::{Config, Session};
//! use speedtrace_model::RecordDump;
//! use std::fs::File;
//!
//! let dump = RecordDump::parse(File::open("session.ndjson").unwrap()).unwrap();
//! let mut session = Session::new(Config::default());
//! session.ingest_all(dump.records);
//! session.finish();
//!
//! println!("Events: {}", session.tree().len());
//! println!("Resources: {}", session.network().len());
//! ```

pub mod aggregate;
pub mod config;
pub mod dominant;
pub mod network;
pub mod normalize;
pub mod profile;
pub mod report;
pub mod session;
pub mod v8;

pub use config::{Config, TimeUnit};
pub use session::Session;

// Re-export the model crate for convenience
pub use speedtrace_model;

use thiserror::Error;

/// Errors that can occur while loading input for a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("record dump error: {0}")]
    Parse(#[from] speedtrace_model::ParseError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for session setup and reporting.
pub type Result<T> = std::result::Result<T, SessionError>;
