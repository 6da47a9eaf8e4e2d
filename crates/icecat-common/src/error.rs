//! Error types for the Icecat ingestion pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Fatal failures of a pipeline run.
///
/// Column-count mismatches are not represented here: they are counted, never raised.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Authentication rejected by {url}: HTTP {status}")]
    Authentication { url: String, status: u16 },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Corrupt archive {path}: {source}")]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No data rows in {0}")]
    EmptyFile(PathBuf),

    #[error("No header line in {0}")]
    MissingHeader(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identity '{value}' on line {line}: {reason}")]
    IdentityParse {
        value: String,
        line: u64,
        reason: String,
    },

    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl IngestError {
    /// Create a transfer error
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a sink write error
    pub fn sink_write(msg: impl Into<String>) -> Self {
        Self::SinkWrite(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Short machine-readable name of the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Authentication { .. } => "authentication",
            IngestError::Transfer(_) => "transfer",
            IngestError::CorruptArchive { .. } => "corrupt_archive",
            IngestError::EmptyFile(_) => "empty_file",
            IngestError::MissingHeader(_) => "missing_header",
            IngestError::Io(_) => "io",
            IngestError::IdentityParse { .. } => "identity_parse",
            IngestError::SinkWrite(_) => "sink_write",
            IngestError::Serialization(_) => "serialization",
            IngestError::Config(_) => "config",
            IngestError::Database(_) => "database",
        }
    }
}
