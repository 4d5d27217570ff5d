//! Shared utilities for rental ETL crates.
//!
//! This crate provides common utilities used across the workspace:
//! Polars value helpers, typed column readers, the order statistics the
//! imputation cascades rely on, and join-key normalization.

pub mod frame;
pub mod keys;
pub mod polars;
pub mod stats;

// Re-export commonly used functions at crate root for convenience
pub use frame::{bool_values, f64_values, list_column, list_values, string_values};
pub use keys::{key_values, normalize_key};
pub use polars::{any_to_f64, any_to_string, format_numeric, parse_bool, parse_f64};
pub use stats::{median, mode};
