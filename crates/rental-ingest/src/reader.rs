//! Collection file readers.
//!
//! Every reader yields all-`String` columns. Typing happens later in the
//! transform, which treats unparsable values as missing.

use std::fs;
use std::path::Path;

use polars::prelude::*;
use serde_json::{Map, Value};

use crate::error::{IngestError, Result};

/// Reads a CSV collection with every column as `String`.
pub fn read_csv_collection(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .finish()
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Reads JSON documents, either one object per line or a single array.
///
/// Columns appear in the order documents introduce them. Nested values are
/// kept as JSON text.
pub fn read_json_collection(path: &Path) -> Result<DataFrame> {
    let text = fs::read_to_string(path).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let documents = if text.trim_start().starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(text).map_err(|source| IngestError::Json {
                path: path.to_path_buf(),
                line: 1,
                source,
            })?;
        values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| into_object(value, path, idx + 1))
            .collect::<Result<Vec<_>>>()?
    } else {
        let mut documents = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|source| IngestError::Json {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
            documents.push(into_object(value, path, idx + 1)?);
        }
        documents
    };

    documents_to_frame(&documents)
}

fn into_object(value: Value, path: &Path, line: usize) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(IngestError::NotAnObject {
            path: path.to_path_buf(),
            line,
        }),
    }
}

fn documents_to_frame(documents: &[Map<String, Value>]) -> Result<DataFrame> {
    let mut names: Vec<&str> = Vec::new();
    for document in documents {
        for key in document.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key.as_str());
            }
        }
    }
    let columns = names
        .iter()
        .map(|name| {
            let values: Vec<Option<String>> = documents
                .iter()
                .map(|document| document.get(*name).and_then(scalar_text))
                .collect();
            Column::new((*name).into(), values)
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Text form of a JSON value; `null` is missing.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        write!(file, "{content}").expect("write");
        file
    }

    fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .expect("column")
            .str()
            .expect("str")
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect()
    }

    #[test]
    fn csv_columns_stay_text() {
        let file = temp_file("id,price,available\n00123,$10.00,t\n456,,f\n", ".csv");
        let df = read_csv_collection(file.path()).expect("read");
        assert_eq!(df.height(), 2);
        assert_eq!(strings(&df, "id"), vec![Some("00123".to_string()), Some("456".to_string())]);
        assert_eq!(df.column("price").expect("price").dtype(), &DataType::String);
    }

    #[test]
    fn json_lines_keep_nested_values_as_text() {
        let file = temp_file(
            concat!(
                r#"{"id": 1, "amenities": ["Wifi", "Kitchen"], "host_is_superhost": true}"#,
                "\n\n",
                r#"{"id": 2, "last_review": {"$date": "2024-01-02T00:00:00Z"}, "amenities": null}"#,
                "\n"
            ),
            ".jsonl",
        );
        let df = read_json_collection(file.path()).expect("read");
        assert_eq!(df.height(), 2);
        assert_eq!(
            strings(&df, "amenities"),
            vec![Some(r#"["Wifi","Kitchen"]"#.to_string()), None]
        );
        assert_eq!(
            strings(&df, "host_is_superhost"),
            vec![Some("true".to_string()), None]
        );
        assert_eq!(
            strings(&df, "last_review")[1].as_deref(),
            Some(r#"{"$date":"2024-01-02T00:00:00Z"}"#)
        );
    }

    #[test]
    fn json_array_documents() {
        let file = temp_file(r#"[{"a": "x"}, {"b": 2.5}]"#, ".json");
        let df = read_json_collection(file.path()).expect("read");
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(strings(&df, "b"), vec![None, Some("2.5".to_string())]);
    }

    #[test]
    fn non_object_lines_are_rejected() {
        let file = temp_file("[1, 2]", ".json");
        let result = read_json_collection(file.path());
        assert!(matches!(result, Err(IngestError::NotAnObject { line: 1, .. })));
    }
}
