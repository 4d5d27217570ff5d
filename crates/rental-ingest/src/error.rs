//! Error types for snapshot extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading a snapshot store.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The store location is not a readable directory.
    #[error("cannot connect to {uri}: {reason}")]
    Connect { uri: String, reason: String },

    /// No file backs the requested collection.
    #[error("collection '{collection}' not found in database '{database}'")]
    MissingCollection {
        collection: String,
        database: String,
    },

    /// Failed to read file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV with Polars.
    #[error("failed to parse CSV {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    /// A JSON document could not be decoded.
    #[error("invalid JSON in {path} at line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A JSON document is not an object.
    #[error("expected a JSON object in {path} at line {line}")]
    NotAnObject { path: PathBuf, line: usize },

    /// Failed DataFrame operation.
    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for IngestError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::MissingCollection {
            collection: "reviews".to_string(),
            database: "madrid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "collection 'reviews' not found in database 'madrid'"
        );
    }

    #[test]
    fn test_error_from_polars() {
        let polars_err = polars::prelude::PolarsError::ColumnNotFound("test".into());
        let ingest_err: IngestError = polars_err.into();
        assert!(matches!(ingest_err, IngestError::DataFrame { .. }));
    }
}
