//! Error types for the checksum synchronisation pipeline.
//!
//! [`PhaseError`] describes why a single request attempt failed; every variant is
//! retried the same way by [`crate::retry::RetryPolicy`]. [`SyncError`] describes
//! why an entry (or the whole run) did not complete.

use std::fmt;
use thiserror::Error;

/// One of the three request phases run for every manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lookup,
    Write,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lookup => write!(f, "lookup"),
            Phase::Write => write!(f, "write"),
            Phase::Verify => write!(f, "verify"),
        }
    }
}

/// Failure of a single request attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// Connection, TLS or timeout failure before a response was received
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("expected status {expected} but got {actual}")]
    UnexpectedStatus { expected: u16, actual: u16 },

    #[error("expected content type application/json but got '{0}'")]
    UnexpectedContentType(String),

    #[error("response body empty")]
    EmptyBody,

    /// Body present but not the JSON record we expected
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl From<reqwest::Error> for PhaseError {
    fn from(e: reqwest::Error) -> Self {
        PhaseError::Transport(e.to_string())
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The manifest line does not have the `<checksum>  <path>` shape or the
    /// path is too short to carry a bucket key.
    #[error("malformed manifest entry '{line}': {reason}")]
    MalformedEntry { line: String, reason: String },

    #[error("unknown bucket key '{key}' in path '{path}'")]
    UnknownBucket { key: String, path: String },

    #[error("{phase} phase gave up after {attempts} attempts: {last_error}")]
    PermanentFailure {
        phase: Phase,
        attempts: u32,
        last_error: PhaseError,
    },

    #[error("checksum mismatch for '{path}': wrote '{written}', read back '{read_back}'")]
    ChecksumMismatch {
        path: String,
        written: String,
        read_back: String,
    },

    #[error("failed to open manifest '{path}': {source}")]
    ManifestOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("record sink error: {0}")]
    Sink(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("pipeline task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn malformed(line: &str, reason: impl Into<String>) -> Self {
        SyncError::MalformedEntry {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
