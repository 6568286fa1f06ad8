//! Error types for the ingestion pipeline
//!
//! Per-record problems ([`ValidationError`]) never leave the transformer; they
//! are counted and dropped. Everything else ends the run and is surfaced as an
//! [`IngestError`] after the checkpoint and ledger have been written.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// A single record failed a domain rule
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    /// Canonical field name that failed (e.g. `country_code`)
    pub field: &'static str,
    /// Human-readable description of the failure
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// A page request failed
///
/// Every variant carries the offset of the page that could not be fetched.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for page at offset {offset} failed: {source}")]
    Transport {
        offset: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("page at offset {offset} returned HTTP {status}")]
    Status { offset: u64, status: StatusCode },

    #[error("page at offset {offset} could not be decoded: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Offset of the page request that failed
    pub fn offset(&self) -> u64 {
        match self {
            FetchError::Transport { offset, .. }
            | FetchError::Status { offset, .. }
            | FetchError::Decode { offset, .. } => *offset,
        }
    }
}

/// Reading or writing the checkpoint file failed
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint at {path} is not valid JSON: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Run-level failure
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
