//! Error types for flat-sheet loading.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("DataFrame operation failed: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Table names are restricted to ASCII letters, digits and `_`.
    #[error("invalid table name '{name}'")]
    InvalidTableName { name: String },

    #[error("invalid export option: {0}")]
    InvalidOption(String),

    /// Stored row count differs from the written frame.
    #[error("table '{table}' holds {found} rows, expected {expected}")]
    Verification {
        table: String,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, OutputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_display() {
        let err = OutputError::Verification {
            table: "flat".to_string(),
            expected: 3,
            found: 2,
        };
        assert_eq!(err.to_string(), "table 'flat' holds 2 rows, expected 3");
    }
}
