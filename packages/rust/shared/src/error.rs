//! Error types for webcatalog.
//!
//! Library crates use [`CatalogError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all webcatalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Caller-supplied input was invalid (malformed URL, bad argument).
    /// Rejected before any side effect.
    #[error("invalid input: {message}")]
    Input { message: String },

    /// Network/HTTP error during crawl, validation, or reconnaissance.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or persistence layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Reconnaissance advisor error (endpoint, response shape).
    #[error("recon error: {0}")]
    Recon(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No job exists with the given id.
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// Phase precondition violation: the strictly preceding phase has not
    /// completed.
    #[error("phase {phase} cannot start: {requires} has not completed")]
    PhaseNotReady { phase: String, requires: String },

    /// An execution is already registered for this job id.
    #[error("job {job_id} already has an active execution")]
    AlreadyRunning { job_id: String },

    /// Unexpected failure inside a phase execution (task join, panic).
    #[error("execution error: {0}")]
    Execution(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
