//! Error taxonomy for the history crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the history crate.
///
/// Per-record and per-file parse failures are logged and recovered from
/// locally (see `classify` and `cache`); they never reach this type. This
/// enum carries only the failures a caller must react to: invalid query
/// input, configuration problems, and I/O failures at the few points where
/// recovery isn't possible (config load, root enumeration).
#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    #[error("invalid query: {field}: {reason}")]
    InvalidQuery { field: &'static str, reason: String },

    #[error("invalid configuration: {field}: {cause}")]
    ConfigError { field: String, cause: String },

    #[error("io error at {path}: {cause}")]
    Io { path: PathBuf, cause: String },
}

pub type Result<T> = std::result::Result<T, HistoryError>;
