//! Nested attribute expansion.
//!
//! Each allow-listed item becomes a 0/1 column named `{attribute}_{slug}`.
//! The column set depends only on configuration: items absent from the
//! data still get an all-zero column, and items outside the allow-list are
//! ignored. The nested column is dropped afterward.

use std::collections::HashSet;
use std::sync::Arc;

use polars::prelude::*;
use rental_common::list_values;
use rental_model::schema::columns;
use rental_model::{PipelineConfig, Result};
use tracing::info;

use crate::normalize::has_column;
use crate::parse::slug;
use crate::pipeline::{PipelineState, TransformStage};
use crate::snapshot::Snapshot;

const STAGE: &str = "expand";

pub struct NestedFieldExpander {
    config: Arc<PipelineConfig>,
}

impl NestedFieldExpander {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    /// `(nested column, allow-list)` pairs expanded on listings.
    fn targets(&self) -> [(&'static str, &[String]); 2] {
        [
            (columns::AMENITIES, self.config.amenities.as_slice()),
            (columns::HOST_VERIFICATIONS, self.config.verifications.as_slice()),
        ]
    }

    /// Indicator column names in output order.
    pub fn indicator_columns(&self) -> Vec<String> {
        self.targets()
            .into_iter()
            .flat_map(|(attribute, allow_list)| indicator_names(attribute, allow_list))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn expand(&self, mut snapshot: Snapshot) -> Result<Snapshot> {
        for (attribute, allow_list) in self.targets() {
            expand_attribute(&mut snapshot.listings, attribute, allow_list)?;
        }
        Ok(snapshot)
    }
}

impl TransformStage for NestedFieldExpander {
    fn run(&self, snapshot: Snapshot, _state: &mut PipelineState) -> Result<Snapshot> {
        self.expand(snapshot)
    }

    fn stage_name(&self) -> &str {
        STAGE
    }
}

/// `(column name, item slug)` per allow-list entry; repeated slugs are kept once.
fn indicator_names(attribute: &str, allow_list: &[String]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    allow_list
        .iter()
        .map(|item| slug(item))
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .map(|item| (format!("{attribute}_{item}"), item))
        .collect()
}

fn expand_attribute(df: &mut DataFrame, attribute: &str, allow_list: &[String]) -> Result<()> {
    let height = df.height();
    let present: Vec<HashSet<String>> = if has_column(df, attribute) {
        list_values(df, attribute)?
            .into_iter()
            .map(|items| {
                items
                    .unwrap_or_default()
                    .iter()
                    .map(|item| slug(item))
                    .collect()
            })
            .collect()
    } else {
        vec![HashSet::new(); height]
    };

    let names = indicator_names(attribute, allow_list);
    let mut hits = 0usize;
    for (name, item) in &names {
        let flags: Vec<i32> = present
            .iter()
            .map(|items| i32::from(items.contains(item)))
            .collect();
        hits += flags.iter().filter(|flag| **flag == 1).count();
        df.with_column(Column::new(name.as_str().into(), flags))?;
    }
    if has_column(df, attribute) {
        *df = df.drop(attribute)?;
    }
    info!(attribute, indicators = names.len(), hits, "expanded nested attribute");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rental_common::list_column;

    fn expander(amenities: &[&str]) -> NestedFieldExpander {
        let config = PipelineConfig::default()
            .with_amenities(amenities.iter().map(|item| (*item).to_string()).collect());
        NestedFieldExpander::new(Arc::new(config))
    }

    fn ints(df: &DataFrame, name: &str) -> Vec<Option<i32>> {
        df.column(name)
            .expect("column")
            .i32()
            .expect("i32")
            .into_iter()
            .collect()
    }

    #[test]
    fn matches_ignore_case_accents_and_punctuation() {
        let listings = DataFrame::new(vec![
            Column::new("id".into(), ["1", "2"]),
            list_column(
                "amenities",
                &[
                    vec!["WIFI".to_string(), "Self check-in".to_string(), "Pool".to_string()],
                    vec!["Café machine".to_string()],
                ],
            ),
        ])
        .expect("listings");
        let snapshot = Snapshot::new(listings, DataFrame::default(), DataFrame::default());
        let expanded = expander(&["Wifi", "Self check-in", "Cafe machine"])
            .expand(snapshot)
            .expect("expand");
        let df = expanded.listings;

        assert_eq!(ints(&df, "amenities_wifi"), vec![Some(1), Some(0)]);
        assert_eq!(ints(&df, "amenities_cafe_machine"), vec![Some(0), Some(1)]);
        assert!(df.column("amenities").is_err());
        assert!(df.column("amenities_pool").is_err());
    }

    #[test]
    fn column_set_is_fixed_without_source() {
        let listings = DataFrame::new(vec![Column::new("id".into(), ["1"])]).expect("listings");
        let snapshot = Snapshot::new(listings, DataFrame::default(), DataFrame::default());
        let expander = expander(&["Wifi", "wifi", "Kitchen"]);
        let df = expander.expand(snapshot).expect("expand").listings;

        let expected = vec![
            "amenities_wifi".to_string(),
            "amenities_kitchen".to_string(),
            "host_verifications_phone".to_string(),
            "host_verifications_email".to_string(),
            "host_verifications_work_email".to_string(),
        ];
        assert_eq!(expander.indicator_columns(), expected);
        for name in &expected {
            assert_eq!(ints(&df, name), vec![Some(0)]);
        }
    }
}
