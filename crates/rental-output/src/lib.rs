//! Flat-sheet loading.
//!
//! Two sinks: a SQLite table (replace or append) with a post-write row count
//! check, and size-bounded CSV parts sized for spreadsheet tools.

mod error;
mod export;
mod sqlite;

// === Error Types ===
pub use error::{OutputError, Result};

// === Spreadsheet Export ===
pub use export::{
    DEFAULT_CHUNK_ROWS, ExportOptions, ExportSummary, SPREADSHEET_ROW_LIMIT, export, part_path,
};

// === SQLite ===
pub use sqlite::{SqliteSink, WriteMode};
