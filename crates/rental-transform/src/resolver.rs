//! Ordered fallback resolver.
//!
//! A resolver fills the missing values of one numeric column by trying a
//! sequence of steps in order. Each step only sees the rows that are still
//! missing after the previous steps, and its aggregates are computed over the
//! values as they stand at that point. A terminal default, when configured,
//! fills whatever is left.
//!
//! ```ignore
//! let resolution = FallbackResolver::new("host_response_rate_pct")
//!     .group_by("host", &["host_id"])
//!     .group_by("group", &["neighbourhood_cleansed", "room_type", "accommodates"])
//!     .global("global")
//!     .resolve(&listings)?;
//! ```

use std::collections::HashMap;

use polars::prelude::DataFrame;
use rental_common::{f64_values, key_values, median, string_values};
use rental_model::Result;
use tracing::debug;

#[derive(Debug, Clone)]
enum StepKind {
    /// Median of the column itself within groups of `keys`; no keys means global.
    Group { keys: Vec<String> },
    /// Look the row's `key` up in a table computed elsewhere.
    Lookup {
        key: String,
        values: HashMap<String, f64>,
    },
}

#[derive(Debug, Clone)]
struct Step {
    label: String,
    kind: StepKind,
}

/// Resolved count for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCount {
    pub label: String,
    pub resolved: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub values: Vec<Option<f64>>,
    pub steps: Vec<StepCount>,
    /// Values that were missing before the first step.
    pub initially_missing: usize,
}

impl Resolution {
    pub fn remaining(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn resolved_by(&self, label: &str) -> usize {
        self.steps
            .iter()
            .filter(|step| step.label == label)
            .map(|step| step.resolved)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct FallbackResolver {
    column: String,
    steps: Vec<Step>,
    default: Option<(String, f64)>,
}

impl FallbackResolver {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            steps: Vec::new(),
            default: None,
        }
    }

    /// Median within groups sharing the values of `keys`.
    pub fn group_by(mut self, label: &str, keys: &[&str]) -> Self {
        self.steps.push(Step {
            label: label.to_string(),
            kind: StepKind::Group {
                keys: keys.iter().map(|key| (*key).to_string()).collect(),
            },
        });
        self
    }

    /// Median over the whole column.
    pub fn global(self, label: &str) -> Self {
        self.group_by(label, &[])
    }

    /// Values keyed by the normalized form of the row's `key` column.
    pub fn lookup(mut self, label: &str, key: &str, values: HashMap<String, f64>) -> Self {
        self.steps.push(Step {
            label: label.to_string(),
            kind: StepKind::Lookup {
                key: key.to_string(),
                values,
            },
        });
        self
    }

    pub fn or_default(mut self, label: &str, value: f64) -> Self {
        self.default = Some((label.to_string(), value));
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Resolves the column of `df` without modifying it.
    ///
    /// Steps whose key columns are absent from `df` resolve nothing.
    pub fn resolve(&self, df: &DataFrame) -> Result<Resolution> {
        let values = f64_values(df, &self.column)?;
        self.resolve_values(df, values)
    }

    /// Resolves `values`, using `df` only for key columns.
    pub fn resolve_values(&self, df: &DataFrame, mut values: Vec<Option<f64>>) -> Result<Resolution> {
        let initially_missing = values.iter().filter(|v| v.is_none()).count();
        let mut steps = Vec::with_capacity(self.steps.len() + 1);

        for step in &self.steps {
            let resolved = if values.iter().any(Option::is_none) {
                match &step.kind {
                    StepKind::Group { keys } => fill_from_groups(df, keys, &mut values)?,
                    StepKind::Lookup { key, values: table } => {
                        fill_from_lookup(df, key, table, &mut values)?
                    }
                }
            } else {
                0
            };
            debug!(column = %self.column, step = %step.label, resolved, "fallback step");
            steps.push(StepCount {
                label: step.label.clone(),
                resolved,
            });
        }

        if let Some((label, default)) = &self.default {
            let mut resolved = 0;
            for value in values.iter_mut().filter(|v| v.is_none()) {
                *value = Some(*default);
                resolved += 1;
            }
            steps.push(StepCount {
                label: label.clone(),
                resolved,
            });
        }

        Ok(Resolution {
            values,
            steps,
            initially_missing,
        })
    }
}

fn has_columns(df: &DataFrame, names: &[String]) -> bool {
    names.iter().all(|name| df.column(name).is_ok())
}

fn fill_from_groups(
    df: &DataFrame,
    keys: &[String],
    values: &mut [Option<f64>],
) -> Result<usize> {
    if !has_columns(df, keys) {
        return Ok(0);
    }
    let key_columns = keys
        .iter()
        .map(|key| string_values(df, key))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let row_key = |idx: usize| -> Option<Vec<&str>> {
        key_columns
            .iter()
            .map(|column| column[idx].as_deref())
            .collect()
    };

    let mut groups: HashMap<Vec<&str>, Vec<f64>> = HashMap::new();
    for (idx, value) in values.iter().enumerate() {
        let (Some(value), Some(key)) = (value, row_key(idx)) else {
            continue;
        };
        groups.entry(key).or_default().push(*value);
    }
    let aggregates: HashMap<Vec<&str>, f64> = groups
        .into_iter()
        .filter_map(|(key, observed)| median(&observed).map(|agg| (key, agg)))
        .collect();

    let mut resolved = 0;
    for (idx, value) in values.iter_mut().enumerate() {
        if value.is_some() {
            continue;
        }
        if let Some(agg) = row_key(idx).and_then(|key| aggregates.get(&key)) {
            *value = Some(*agg);
            resolved += 1;
        }
    }
    Ok(resolved)
}

fn fill_from_lookup(
    df: &DataFrame,
    key: &str,
    table: &HashMap<String, f64>,
    values: &mut [Option<f64>],
) -> Result<usize> {
    if table.is_empty() || df.column(key).is_err() {
        return Ok(0);
    }
    let keys = key_values(df, key)?;
    let mut resolved = 0;
    for (value, key) in values.iter_mut().zip(keys) {
        if value.is_some() {
            continue;
        }
        if let Some(found) = key.and_then(|key| table.get(&key)) {
            *value = Some(*found);
            resolved += 1;
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;

    fn listings() -> DataFrame {
        DataFrame::new(vec![
            Column::new("host".into(), ["h1", "h1", "h2", "h3", "h4"]),
            Column::new("hood".into(), [Some("A"), Some("A"), Some("A"), Some("B"), None]),
            Column::new("rate".into(), [Some(80.0), None, Some(90.0), None, None]),
        ])
        .expect("frame")
    }

    #[test]
    fn steps_only_touch_missing_values() {
        let resolution = FallbackResolver::new("rate")
            .group_by("host", &["host"])
            .group_by("hood", &["hood"])
            .global("global")
            .resolve(&listings())
            .expect("resolve");

        assert_eq!(
            resolution.values,
            vec![Some(80.0), Some(80.0), Some(90.0), Some(80.0), Some(80.0)]
        );
        assert_eq!(resolution.resolved_by("host"), 1);
        assert_eq!(resolution.resolved_by("hood"), 0);
        assert_eq!(resolution.resolved_by("global"), 2);
        assert_eq!(resolution.initially_missing, 3);
        assert_eq!(resolution.remaining(), 0);
    }

    #[test]
    fn later_steps_see_earlier_fills() {
        // h1's second row is filled by the host step before the hood median
        // is computed, so hood A aggregates over 80, 80, 90.
        let df = DataFrame::new(vec![
            Column::new("host".into(), ["h1", "h1", "h2", "h5"]),
            Column::new("hood".into(), ["A", "A", "A", "A"]),
            Column::new("rate".into(), [Some(80.0), None, Some(90.0), None]),
        ])
        .expect("frame");
        let resolution = FallbackResolver::new("rate")
            .group_by("host", &["host"])
            .group_by("hood", &["hood"])
            .resolve(&df)
            .expect("resolve");
        assert_eq!(resolution.values[3], Some(80.0));
    }

    #[test]
    fn null_group_keys_are_skipped() {
        let resolution = FallbackResolver::new("rate")
            .group_by("hood", &["hood"])
            .resolve(&listings())
            .expect("resolve");
        assert_eq!(resolution.values[4], None);
        assert_eq!(resolution.values[3], None);
        assert_eq!(resolution.values[1], Some(85.0));
    }

    #[test]
    fn lookup_and_default_close_the_cascade() {
        let table = HashMap::from([("h3".to_string(), 120.0)]);
        let resolution = FallbackResolver::new("rate")
            .lookup("calendar", "host", table)
            .or_default("default", 0.0)
            .resolve(&listings())
            .expect("resolve");
        assert_eq!(resolution.values[3], Some(120.0));
        assert_eq!(resolution.values[4], Some(0.0));
        assert_eq!(resolution.resolved_by("calendar"), 1);
        assert_eq!(resolution.resolved_by("default"), 2);
    }

    #[test]
    fn missing_key_columns_resolve_nothing() {
        let resolution = FallbackResolver::new("rate")
            .group_by("group", &["hood", "absent"])
            .resolve(&listings())
            .expect("resolve");
        assert_eq!(resolution.resolved_by("group"), 0);
        assert_eq!(resolution.remaining(), 3);
    }
}
