//! Join-key normalization.
//!
//! Identifiers arrive as integers, floats or text depending on the source.
//! Keys are compared as trimmed strings with integral float spellings
//! (`"42.0"`) reduced to their integer form, so `42`, `42.0` and `" 42 "`
//! all match.

use polars::prelude::{DataFrame, PolarsResult};

use crate::frame::string_values;

/// Canonical string form of a key, or `None` for blank input.
///
/// ```
/// use rental_common::normalize_key;
///
/// assert_eq!(normalize_key(" 42.0 "), Some("42".to_string()));
/// assert_eq!(normalize_key("abc"), Some("abc".to_string()));
/// assert_eq!(normalize_key("  "), None);
/// ```
pub fn normalize_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some((integer, fraction)) = trimmed.split_once('.') {
        let digits = integer.strip_prefix('-').unwrap_or(integer);
        let integral = !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !fraction.is_empty()
            && fraction.bytes().all(|b| b == b'0');
        if integral {
            return Some(integer.to_string());
        }
    }
    Some(trimmed.to_string())
}

/// Reads a column as normalized keys.
pub fn key_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    Ok(string_values(df, name)?
        .into_iter()
        .map(|value| value.as_deref().and_then(normalize_key))
        .collect())
}
