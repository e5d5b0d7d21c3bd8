//! Error types for scope tracking, batch analysis and configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to close a scope.
///
/// Either variant is fatal to that scope's report. Callers on the live path
/// log it and move on; it never reaches the host request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The statement log is shorter than it was at `begin`, which means it
    /// was reset underneath the scope.
    #[error("statement log shrunk below scope start (start={start}, len={len})")]
    LogShrunk { start: usize, len: usize },

    /// `end` was already called on this handle.
    #[error("scope '{label}' already ended")]
    AlreadyEnded { label: String },
}

/// A batch log line that matched none of the known record formats.
///
/// Recovered locally by skipping the line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line_number}: no known statement format")]
pub struct MalformedLogLine {
    pub line_number: usize,
}

/// Errors that abort a batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The input log cannot be opened.
    #[error("cannot open log '{}': {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading from an already opened log failed.
    #[error("read error in '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The report file cannot be written.
    #[error("cannot write report to '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Invalid threshold configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidNumber { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("environment variable {var}: cannot parse '{value}'")]
    BadEnv { var: &'static str, value: String },

    #[error("malformed config document: {0}")]
    Document(String),

    #[error("global threshold config already initialized")]
    AlreadyInitialized,
}
