//! SQLite persistence for the flat sheet.
//!
//! Column affinities follow the frame dtypes: integers and booleans become
//! `INTEGER`, floats `REAL`, everything else `TEXT` (lists are rendered as
//! text). Rows are inserted in a single transaction.

use std::path::Path;

use polars::prelude::{DataFrame, DataType};
use rental_common::{bool_values, f64_values, string_values};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::{info, warn};

use crate::error::{OutputError, Result};

/// What happens to an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Drop and recreate the table.
    #[default]
    Replace,
    /// Create the table if needed and add rows.
    Append,
}

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens (or creates) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| OutputError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened sqlite database");
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Writes every row of `df` into `table`; returns the number of rows written.
    pub fn insert(&mut self, df: &DataFrame, table: &str, mode: WriteMode) -> Result<usize> {
        let table_ident = quote_table(table)?;
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let columns = names
            .iter()
            .map(|name| column_values(df, name))
            .collect::<Result<Vec<_>>>()?;
        let definitions: Vec<String> = names
            .iter()
            .map(|name| {
                let affinity = affinity(df.column(name)?.dtype());
                Ok(format!("{} {affinity}", quote_ident(name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let tx = self.conn.transaction()?;
        if mode == WriteMode::Replace {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {table_ident};"))?;
        }
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table_ident} ({});",
            definitions.join(", ")
        ))?;

        let rows = df.height();
        if !names.is_empty() {
            let column_list: Vec<String> = names.iter().map(|name| quote_ident(name)).collect();
            let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {table_ident} ({}) VALUES ({})",
                column_list.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..rows {
                stmt.execute(params_from_iter(columns.iter().map(|values| &values[row])))?;
            }
        }
        tx.commit()?;
        info!(table, rows, columns = names.len(), mode = ?mode, "inserted flat sheet");
        Ok(rows)
    }

    /// Row count currently stored in `table`.
    pub fn verify(&self, table: &str) -> Result<usize> {
        let table_ident = quote_table(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table_ident}"), [], |row| row.get(0))?;
        let count = usize::try_from(count).unwrap_or_default();
        info!(table, rows = count, "verified stored rows");
        Ok(count)
    }

    /// Row count of `table`, or zero when the table does not exist yet.
    pub fn existing_rows(&self, table: &str) -> Result<usize> {
        quote_table(table)?;
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        if exists { self.verify(table) } else { Ok(0) }
    }

    /// Fails with [`OutputError::Verification`] when the stored count differs.
    pub fn verify_count(&self, table: &str, expected: usize) -> Result<usize> {
        let found = self.verify(table)?;
        if found != expected {
            warn!(table, expected, found, "stored row count does not match");
            return Err(OutputError::Verification {
                table: table.to_string(),
                expected,
                found,
            });
        }
        Ok(found)
    }
}

fn affinity(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "INTEGER",
        DataType::Float32 | DataType::Float64 => "REAL",
        _ => "TEXT",
    }
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Value>> {
    let column = df.column(name)?;
    let values = match column.dtype() {
        DataType::Boolean => bool_values(df, name)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |b| Value::Integer(i64::from(b))))
            .collect(),
        dtype if affinity(dtype) == "INTEGER" => column
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Integer))
            .collect(),
        dtype if affinity(dtype) == "REAL" => f64_values(df, name)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Real))
            .collect(),
        _ => string_values(df, name)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Text))
            .collect(),
    };
    Ok(values)
}

fn quote_table(name: &str) -> Result<String> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(OutputError::InvalidTableName {
            name: name.to_string(),
        });
    }
    Ok(quote_ident(name))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("listing_id".into(), ["1", "2"]),
            Column::new("booked_night".into(), [1i32, 0]),
            Column::new("daily_revenue".into(), [Some(55.5), None]),
            Column::new("available".into(), [false, true]),
        ])
        .expect("frame")
    }

    #[test]
    fn replace_then_append() {
        let mut sink = SqliteSink::in_memory().expect("sqlite");
        assert_eq!(sink.insert(&frame(), "flat", WriteMode::Replace).expect("insert"), 2);
        assert_eq!(sink.verify("flat").expect("verify"), 2);
        sink.insert(&frame(), "flat", WriteMode::Append).expect("append");
        assert_eq!(sink.verify("flat").expect("verify"), 4);
        sink.insert(&frame(), "flat", WriteMode::Replace).expect("replace");
        assert_eq!(sink.verify_count("flat", 2).expect("count"), 2);
    }

    #[test]
    fn values_keep_their_affinity() {
        let mut sink = SqliteSink::in_memory().expect("sqlite");
        sink.insert(&frame(), "flat", WriteMode::Replace).expect("insert");
        let (revenue, available): (Option<f64>, i64) = sink
            .conn
            .query_row(
                "SELECT daily_revenue, available FROM flat WHERE listing_id = '2'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("row");
        assert_eq!(revenue, None);
        assert_eq!(available, 1);
    }

    #[test]
    fn existing_rows_of_missing_table_is_zero() {
        let mut sink = SqliteSink::in_memory().expect("sqlite");
        assert_eq!(sink.existing_rows("flat").expect("count"), 0);
        sink.insert(&frame(), "flat", WriteMode::Replace).expect("insert");
        assert_eq!(sink.existing_rows("flat").expect("count"), 2);
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let mut sink = SqliteSink::in_memory().expect("sqlite");
        let result = sink.insert(&frame(), "flat; DROP TABLE x", WriteMode::Replace);
        assert!(matches!(result, Err(OutputError::InvalidTableName { .. })));
    }

    #[test]
    fn count_mismatch_is_reported() {
        let mut sink = SqliteSink::in_memory().expect("sqlite");
        sink.insert(&frame(), "flat", WriteMode::Replace).expect("insert");
        let result = sink.verify_count("flat", 3);
        assert!(matches!(
            result,
            Err(OutputError::Verification { found: 2, expected: 3, .. })
        ));
    }
}
