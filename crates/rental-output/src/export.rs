//! Size-bounded spreadsheet export.
//!
//! The frame is written as CSV parts `{stem}_part{n}.csv` next to
//! `base_path`. Rows are converted and written in bounded chunks, and each
//! chunk is flushed before the next one is read, so memory stays
//! proportional to the chunk size. A part never exceeds the spreadsheet row
//! limit. Only columns named in [`ExportOptions::text_columns`] are
//! truncated; keys, dates and numbers are written as they are.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use rental_common::string_values;
use tracing::{debug, info};

use crate::error::{OutputError, Result};

/// Data rows per sheet: 1,048,576 spreadsheet rows minus the header.
pub const SPREADSHEET_ROW_LIMIT: usize = 1_048_575;

pub const DEFAULT_CHUNK_ROWS: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Data rows per file, capped at [`SPREADSHEET_ROW_LIMIT`].
    pub max_rows_per_file: usize,
    /// Maximum characters kept in a text cell.
    pub truncate_text: Option<usize>,
    /// Free-text columns subject to `truncate_text`.
    pub text_columns: BTreeSet<String>,
    /// Rows converted and flushed at a time.
    pub chunk_rows: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_rows_per_file: SPREADSHEET_ROW_LIMIT,
            truncate_text: Some(32_767),
            text_columns: BTreeSet::new(),
            chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

impl ExportOptions {
    pub fn with_max_rows_per_file(mut self, rows: usize) -> Self {
        self.max_rows_per_file = rows;
        self
    }

    pub fn with_truncate_text(mut self, limit: Option<usize>) -> Self {
        self.truncate_text = limit;
        self
    }

    pub fn with_text_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows;
        self
    }

    fn rows_per_file(&self) -> usize {
        self.max_rows_per_file.min(SPREADSHEET_ROW_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub rows: usize,
    pub truncated_cells: usize,
}

/// Writes `df` to one or more CSV parts derived from `base_path`.
pub fn export(df: &DataFrame, base_path: &Path, options: &ExportOptions) -> Result<ExportSummary> {
    if options.max_rows_per_file == 0 || options.chunk_rows == 0 {
        return Err(OutputError::InvalidOption(
            "row limits must be greater than zero".to_string(),
        ));
    }
    if let Some(parent) = base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| OutputError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let header: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let rows_per_file = options.rows_per_file();
    let total = df.height();
    let parts = total.div_ceil(rows_per_file).max(1);

    let mut files = Vec::with_capacity(parts);
    let mut truncated_cells = 0;
    for part in 0..parts {
        let path = part_path(base_path, part + 1);
        let file = File::create(&path).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        writer.write_record(&header)?;

        let start = part * rows_per_file;
        let end = (start + rows_per_file).min(total);
        let mut offset = start;
        while offset < end {
            let len = options.chunk_rows.min(end - offset);
            let chunk = df.slice(offset as i64, len);
            truncated_cells += write_chunk(&mut writer, &chunk, &header, options)?;
            writer.flush().map_err(|source| OutputError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), offset, rows = len, "wrote chunk");
            offset += len;
        }
        info!(path = %path.display(), rows = end - start, "wrote export part");
        files.push(path);
    }

    info!(
        files = files.len(),
        rows = total,
        truncated_cells,
        "exported flat sheet"
    );
    Ok(ExportSummary {
        files,
        rows: total,
        truncated_cells,
    })
}

/// `{dir}/{stem}_part{n}.csv`; any extension on `base_path` is replaced.
pub fn part_path(base_path: &Path, part: usize) -> PathBuf {
    let stem = base_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("flat_sheet");
    base_path.with_file_name(format!("{stem}_part{part}.csv"))
}

fn write_chunk<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    chunk: &DataFrame,
    header: &[String],
    options: &ExportOptions,
) -> Result<usize> {
    let columns = header
        .iter()
        .map(|name| {
            let limit = options
                .truncate_text
                .filter(|_| options.text_columns.contains(name));
            string_values(chunk, name).map(|values| (values, limit))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut truncated = 0;
    let mut record = Vec::with_capacity(columns.len());
    for row in 0..chunk.height() {
        record.clear();
        for (values, limit) in &columns {
            let cell = values[row].as_deref().unwrap_or("");
            let (cell, cut) = truncate(cell, *limit);
            truncated += usize::from(cut);
            record.push(cell);
        }
        writer.write_record(&record)?;
    }
    Ok(truncated)
}

fn truncate(cell: &str, limit: Option<usize>) -> (&str, bool) {
    match limit {
        Some(limit) => match cell.char_indices().nth(limit) {
            Some((idx, _)) => (&cell[..idx], true),
            None => (cell, false),
        },
        None => (cell, false),
    }
}
