//! Directory-backed snapshot store.
//!
//! A database is a directory under the store root; each collection is a
//! `{name}.csv`, `{name}.jsonl` or `{name}.json` file inside it.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::reader::{read_csv_collection, read_json_collection};

/// Collection file extensions, in lookup order.
const EXTENSIONS: [&str; 3] = ["csv", "jsonl", "json"];

#[derive(Debug)]
pub struct SnapshotStore {
    uri: String,
    database: String,
    path: PathBuf,
}

impl SnapshotStore {
    /// Opens `database` under `uri` (a path or a `file://` URI).
    pub fn connect(uri: &str, database: &str) -> Result<Self> {
        let root = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
        if !root.is_dir() {
            return Err(IngestError::Connect {
                uri: uri.to_string(),
                reason: "store root is not a directory".to_string(),
            });
        }
        let path = root.join(database);
        if !path.is_dir() {
            return Err(IngestError::Connect {
                uri: uri.to_string(),
                reason: format!("database '{database}' does not exist"),
            });
        }
        info!(uri, database, "connected to snapshot store");
        Ok(Self {
            uri: uri.to_string(),
            database: database.to_string(),
            path,
        })
    }

    /// Collection names available in the database, sorted.
    pub fn collections(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.path).map_err(|source| IngestError::FileRead {
            path: self.path.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| IngestError::FileRead {
                path: self.path.clone(),
                source,
            })?;
            let path = entry.path();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext));
            if let (true, Some(stem)) = (supported, path.file_stem().and_then(|s| s.to_str())) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Loads one collection as an all-`String` table.
    pub fn fetch(&self, collection: &str) -> Result<DataFrame> {
        let Some(file) = self.collection_path(collection) else {
            return Err(IngestError::MissingCollection {
                collection: collection.to_string(),
                database: self.database.clone(),
            });
        };
        debug!(collection, path = %file.display(), "reading collection");
        let df = match file.extension().and_then(|ext| ext.to_str()) {
            Some("csv") => read_csv_collection(&file)?,
            _ => read_json_collection(&file)?,
        };
        info!(
            collection,
            rows = df.height(),
            columns = df.width(),
            "fetched collection"
        );
        Ok(df)
    }

    /// Releases the store handle.
    pub fn disconnect(self) {
        info!(uri = %self.uri, database = %self.database, "disconnected from snapshot store");
    }

    fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.path.join(format!("{collection}.{ext}")))
            .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_requires_existing_database() {
        let dir = tempfile::tempdir().expect("temp dir");
        let uri = format!("file://{}", dir.path().display());
        let result = SnapshotStore::connect(&uri, "missing");
        assert!(matches!(result, Err(IngestError::Connect { .. })));

        let result = SnapshotStore::connect("/definitely/not/here", "db");
        assert!(matches!(result, Err(IngestError::Connect { .. })));
    }

    #[test]
    fn csv_is_preferred_over_json() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = dir.path().join("madrid");
        fs::create_dir(&db).expect("db dir");
        fs::write(db.join("listings.csv"), "id\n1\n2\n").expect("csv");
        fs::write(db.join("listings.json"), r#"[{"id": "9"}]"#).expect("json");

        let store = SnapshotStore::connect(dir.path().to_str().expect("utf8"), "madrid")
            .expect("connect");
        assert_eq!(store.fetch("listings").expect("fetch").height(), 2);
        assert_eq!(store.collections().expect("collections"), vec!["listings"]);
    }
}
