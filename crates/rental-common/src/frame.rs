//! Typed column readers and writers.
//!
//! Stages read a column into a plain `Vec<Option<T>>`, work on the values,
//! and write the result back as a new `Column`. Readers accept any
//! source dtype so raw string tables and already typed tables go through the
//! same code.

use polars::prelude::*;

use crate::polars::{any_to_f64, any_to_string, format_numeric, parse_bool, parse_f64};

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Reads a column as optional strings. Numbers render without trailing zeros.
pub fn string_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?;
    match column.dtype() {
        DataType::String => Ok(column
            .str()?
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect()),
        DataType::Float32 | DataType::Float64 => {
            let cast = column.cast(&DataType::Float64)?;
            Ok(cast
                .f64()?
                .into_iter()
                .map(|value| value.map(format_numeric))
                .collect())
        }
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let cast = column.cast(&DataType::Int64)?;
            Ok(cast
                .i64()?
                .into_iter()
                .map(|value| value.map(|v| v.to_string()))
                .collect())
        }
        _ => (0..column.len())
            .map(|idx| {
                column
                    .get(idx)
                    .map(|value| (!value.is_null()).then(|| any_to_string(value)))
            })
            .collect(),
    }
}

/// Reads a column as optional floats. Unparsable strings become `None`.
pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?;
    match column.dtype() {
        DataType::String => Ok(column
            .str()?
            .into_iter()
            .map(|value| value.and_then(parse_f64))
            .collect()),
        DataType::Boolean => Ok(column
            .bool()?
            .into_iter()
            .map(|value| value.map(|flag| if flag { 1.0 } else { 0.0 }))
            .collect()),
        dtype if is_numeric_dtype(dtype) => {
            let cast = column.cast(&DataType::Float64)?;
            Ok(cast
                .f64()?
                .into_iter()
                .map(|value| value.filter(|v| v.is_finite()))
                .collect())
        }
        _ => (0..column.len())
            .map(|idx| column.get(idx).map(any_to_f64))
            .collect(),
    }
}

/// Reads a column as optional booleans. Text tokens go through [`parse_bool`].
pub fn bool_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<bool>>> {
    let column = df.column(name)?;
    if column.dtype() == &DataType::Boolean {
        return Ok(column.bool()?.into_iter().collect());
    }
    Ok(string_values(df, name)?
        .into_iter()
        .map(|value| value.as_deref().and_then(parse_bool))
        .collect())
}

/// Reads a list column as optional string vectors.
///
/// Returns `None` for every row when the column is not list-typed; callers
/// that accept text encodings parse those themselves.
pub fn list_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<Vec<String>>>> {
    let column = df.column(name)?;
    if !matches!(column.dtype(), DataType::List(_)) {
        return Ok(vec![None; column.len()]);
    }
    let mut values = Vec::with_capacity(column.len());
    for entry in column.list()?.into_iter() {
        let Some(series) = entry else {
            values.push(None);
            continue;
        };
        let series = series.cast(&DataType::String)?;
        let items = series
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        values.push(Some(items));
    }
    Ok(values)
}

/// Builds a `List(String)` column.
pub fn list_column(name: &str, values: &[Vec<String>]) -> Column {
    if values.is_empty() {
        return Column::full_null(name.into(), 0, &DataType::List(Box::new(DataType::String)));
    }
    let mut ca: ListChunked = values
        .iter()
        .map(|items| Some(Series::new(PlSmallStr::EMPTY, items.as_slice())))
        .collect();
    ca.rename(name.into());
    ca.into_series().into_column()
}
