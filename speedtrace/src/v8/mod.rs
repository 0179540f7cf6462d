//! V8 profiler log parsing.
//!
//! The V8 tick profiler writes a comma separated log with one command per
//! line. A log may announce a compression window, after which lines can
//! back-reference earlier lines. Code addresses are usually written as
//! deltas against a running per-tag base.
//!
//! - [`decompressor`] undoes back-reference compression and splits lines.
//! - [`symbols`] maps code addresses to the symbols covering them.
//! - [`parser`] drives both and accumulates ticks into a profile.

pub mod decompressor;
pub mod parser;
pub mod symbols;

pub use decompressor::{LogDecompressor, split_log_line, split_fields};
pub use parser::{ParseStats, V8LogParser};
pub use symbols::{Symbol, SymbolTable, SymbolType};

use thiserror::Error;

/// Problems with a single log line. These never abort a whole log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogLineError {
    #[error("malformed back-reference '{0}'")]
    BadBackReference(String),

    #[error("back-reference to line {0} is outside the window")]
    BackReferenceOutOfWindow(usize),

    #[error("invalid address '{0}'")]
    BadAddress(String),

    #[error("invalid number '{0}'")]
    BadNumber(String),

    #[error("'{command}' expects at least {expected} fields, got {found}")]
    MissingFields {
        command: String,
        expected: usize,
        found: usize,
    },
}
