use std::path::PathBuf;

use rental_model::{ImputationAudit, PipelineConfig};
use rental_output::{ExportOptions, ExportSummary, WriteMode};

/// Collection names inside the source database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub listings: String,
    pub calendar: String,
    pub reviews: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            listings: "listings".to_string(),
            calendar: "calendar".to_string(),
            reviews: "reviews".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteTarget {
    pub path: PathBuf,
    pub table: String,
    pub mode: WriteMode,
}

#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub base_path: PathBuf,
    pub options: ExportOptions,
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct EtlOptions {
    pub uri: String,
    pub database: String,
    pub collections: CollectionNames,
    pub config: PipelineConfig,
    /// `None` skips the SQLite load.
    pub sqlite: Option<SqliteTarget>,
    /// `None` skips the spreadsheet export.
    pub export: Option<ExportTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCount {
    pub collection: String,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct SqliteOutcome {
    pub path: PathBuf,
    pub table: String,
    pub written: usize,
    /// Rows the table should hold after the write (existing rows included on append).
    pub expected: usize,
    pub stored: usize,
}

impl SqliteOutcome {
    pub fn verified(&self) -> bool {
        self.expected == self.stored
    }
}

#[derive(Debug, Clone)]
pub struct EtlResult {
    pub sources: Vec<SourceCount>,
    pub flat_rows: usize,
    pub flat_columns: usize,
    /// Set when the calendar could not be joined and nothing was loaded.
    pub unjoined_reason: Option<String>,
    pub executed_stages: Vec<String>,
    pub audit: ImputationAudit,
    pub sqlite: Option<SqliteOutcome>,
    pub export: Option<ExportSummary>,
}

impl EtlResult {
    pub fn has_errors(&self) -> bool {
        self.unjoined_reason.is_some()
    }
}
