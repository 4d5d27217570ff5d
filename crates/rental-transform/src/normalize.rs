//! Type normalization.
//!
//! Each declared column is parsed according to its role and written back
//! under its normalized name; absent optional columns are materialized as
//! all-null columns of the role's dtype. Review-date anchors on listings are
//! completed here from reviews, calendar and the scrape date.

use std::collections::HashMap;
use std::sync::Arc;

use polars::prelude::*;
use rental_common::{bool_values, f64_values, key_values, list_column, list_values, string_values};
use rental_model::schema::columns;
use rental_model::{
    ColumnRole, ColumnSpec, ImputationAudit, PipelineConfig, Result, TableKind, TableSchema,
};
use tracing::{info, warn};

use crate::parse::{clean_text, parse_currency, parse_list, parse_percent, to_iso_date, to_iso_timestamp};
use crate::pipeline::{PipelineState, TransformStage};
use crate::snapshot::Snapshot;

const STAGE: &str = "normalize";

pub struct TypeNormalizer {
    config: Arc<PipelineConfig>,
}

impl TypeNormalizer {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn normalize(&self, snapshot: Snapshot, audit: &mut ImputationAudit) -> Result<Snapshot> {
        let listings = self.normalize_table(snapshot.listings, &TableSchema::listings())?;
        let calendar = self.normalize_table(snapshot.calendar, &TableSchema::calendar())?;
        let reviews = self.normalize_table(snapshot.reviews, &TableSchema::reviews())?;
        let mut normalized = Snapshot::new(listings, calendar, reviews);
        self.fill_review_anchors(&mut normalized, audit)?;
        Ok(normalized)
    }

    /// Normalizes one table against its schema.
    pub fn normalize_table(&self, mut df: DataFrame, schema: &TableSchema) -> Result<DataFrame> {
        let table = schema.kind;
        if table == TableKind::Calendar {
            let dropped = drop_present(&mut df, &self.config.calendar_drop)?;
            if !dropped.is_empty() {
                info!(table = %table, columns = ?dropped, "dropped unused columns");
            }
        }

        let check = schema.check(&df);
        if !check.missing_keys.is_empty() {
            warn!(table = %table, columns = ?check.missing_keys, "key columns absent");
        }
        if !check.missing_optional.is_empty() {
            info!(
                table = %table,
                columns = ?check.missing_optional,
                "materializing absent columns as nulls"
            );
        }

        let height = df.height();
        for spec in &schema.columns {
            let name = spec.name();
            let source = if has_column(&df, name) {
                name.to_string()
            } else if has_column(&df, &spec.source) {
                spec.source.clone()
            } else {
                if !spec.key {
                    df.with_column(Column::full_null(
                        name.into(),
                        height,
                        &spec.role.normalized_dtype(),
                    ))?;
                }
                continue;
            };
            let column = normalize_column(&df, &source, spec)?;
            df.with_column(column)?;
            if spec.source != name && has_column(&df, &spec.source) {
                df = df.drop(&spec.source)?;
            }
        }

        let (rows, cols) = df.shape();
        info!(table = %table, rows, columns = cols, "normalized table");
        Ok(df)
    }

    /// Completes `first_review` / `last_review` on listings.
    ///
    /// Sources in order: the listing's earliest/latest review date, its
    /// earliest/latest calendar date, its `last_scraped` date, the date sentinel.
    fn fill_review_anchors(&self, snapshot: &mut Snapshot, audit: &mut ImputationAudit) -> Result<()> {
        let review_range = date_range_by_listing(&snapshot.reviews)?;
        let calendar_range = date_range_by_listing(&snapshot.calendar)?;
        let listings = &mut snapshot.listings;
        let height = listings.height();
        let ids = if has_column(listings, columns::ID) {
            key_values(listings, columns::ID)?
        } else {
            vec![None; height]
        };
        let scraped = if has_column(listings, columns::LAST_SCRAPED) {
            string_values(listings, columns::LAST_SCRAPED)?
        } else {
            vec![None; height]
        };

        for (anchor, pick_first) in [(columns::FIRST_REVIEW, true), (columns::LAST_REVIEW, false)] {
            let mut values = string_values(listings, anchor)?;
            let mut counts = [0usize; 4];
            for (idx, value) in values.iter_mut().enumerate() {
                if value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                    continue;
                }
                let pick = |range: &HashMap<String, (String, String)>| {
                    ids[idx].as_ref().and_then(|id| range.get(id)).map(|(first, last)| {
                        if pick_first { first.clone() } else { last.clone() }
                    })
                };
                let (source, filled) = if let Some(date) = pick(&review_range) {
                    (0, date)
                } else if let Some(date) = pick(&calendar_range) {
                    (1, date)
                } else if let Some(date) = scraped[idx].clone().filter(|d| !d.trim().is_empty()) {
                    (2, date)
                } else {
                    (3, self.config.date_sentinel.clone())
                };
                counts[source] += 1;
                *value = Some(filled);
            }
            listings.with_column(Column::new(anchor.into(), values))?;

            let [reviews, calendar, last_scraped, fallback] = counts;
            info!(
                column = anchor,
                reviews, calendar, last_scraped, fallback, "completed review anchor"
            );
            for (step, count) in ["reviews", "calendar", "last_scraped", "fallback"]
                .into_iter()
                .zip(counts)
            {
                audit.record(STAGE, TableKind::Listings.as_str(), anchor, step, count);
            }
        }
        Ok(())
    }
}

impl TransformStage for TypeNormalizer {
    fn run(&self, snapshot: Snapshot, state: &mut PipelineState) -> Result<Snapshot> {
        self.normalize(snapshot, &mut state.audit)
    }

    fn stage_name(&self) -> &str {
        STAGE
    }
}

pub(crate) fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

fn drop_present(df: &mut DataFrame, names: &[String]) -> Result<Vec<String>> {
    let mut dropped = Vec::new();
    for name in names {
        if has_column(df, name) {
            *df = df.drop(name)?;
            dropped.push(name.clone());
        }
    }
    Ok(dropped)
}

fn normalize_column(df: &DataFrame, source: &str, spec: &ColumnSpec) -> Result<Column> {
    let name: PlSmallStr = spec.name().into();
    let column = match spec.role {
        ColumnRole::Identifier => Column::new(name, key_values(df, source)?),
        ColumnRole::Price => Column::new(name, parsed_numbers(df, source, parse_currency)?),
        ColumnRole::Rate => Column::new(name, parsed_numbers(df, source, parse_percent)?),
        ColumnRole::Score
        | ColumnRole::Coordinate
        | ColumnRole::Counter
        | ColumnRole::Measure
        | ColumnRole::ReviewActivity => Column::new(name, f64_values(df, source)?),
        ColumnRole::Flag | ColumnRole::Availability => Column::new(name, bool_values(df, source)?),
        ColumnRole::Categorical | ColumnRole::Text => {
            Column::new(name, mapped_strings(df, source, |v| Some(clean_text(v)))?)
        }
        ColumnRole::Date => Column::new(name, mapped_strings(df, source, to_iso_date)?),
        ColumnRole::Timestamp => Column::new(name, mapped_strings(df, source, to_iso_timestamp)?),
        ColumnRole::NestedList => list_column(spec.name(), &nested_values(df, source)?),
    };
    Ok(column)
}

/// Parses text with `parser`; numeric columns are read as they are.
fn parsed_numbers(
    df: &DataFrame,
    source: &str,
    parser: fn(&str) -> Option<f64>,
) -> Result<Vec<Option<f64>>> {
    if df.column(source)?.dtype() != &DataType::String {
        return Ok(f64_values(df, source)?);
    }
    Ok(string_values(df, source)?
        .into_iter()
        .map(|value| value.as_deref().and_then(parser))
        .collect())
}

fn mapped_strings<F>(df: &DataFrame, source: &str, map: F) -> Result<Vec<Option<String>>>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(string_values(df, source)?
        .into_iter()
        .map(|value| value.as_deref().and_then(&map))
        .collect())
}

/// Nested attributes as lists; blanks and nulls become empty lists.
fn nested_values(df: &DataFrame, source: &str) -> Result<Vec<Vec<String>>> {
    if matches!(df.column(source)?.dtype(), DataType::List(_)) {
        return Ok(list_values(df, source)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect());
    }
    Ok(string_values(df, source)?
        .into_iter()
        .map(|value| value.as_deref().map(parse_list).unwrap_or_default())
        .collect())
}

/// Earliest and latest ISO date per listing key.
fn date_range_by_listing(df: &DataFrame) -> Result<HashMap<String, (String, String)>> {
    let mut ranges: HashMap<String, (String, String)> = HashMap::new();
    if !has_column(df, columns::LISTING_ID) || !has_column(df, columns::DATE) {
        return Ok(ranges);
    }
    let ids = key_values(df, columns::LISTING_ID)?;
    let dates = string_values(df, columns::DATE)?;
    for (id, date) in ids.into_iter().zip(dates) {
        let (Some(id), Some(date)) = (id, date) else {
            continue;
        };
        ranges
            .entry(id)
            .and_modify(|(first, last)| {
                if date < *first {
                    *first = date.clone();
                }
                if date > *last {
                    *last = date.clone();
                }
            })
            .or_insert_with(|| (date.clone(), date.clone()));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TypeNormalizer {
        TypeNormalizer::new(Arc::new(PipelineConfig::default()))
    }

    #[test]
    fn calendar_prices_and_drops() {
        let calendar = DataFrame::new(vec![
            Column::new("listing_id".into(), ["1", "2"]),
            Column::new("date".into(), ["2024-01-01", "bad"]),
            Column::new("price".into(), [Some("$1,200.00"), None]),
            Column::new("adjusted_price".into(), ["$1", "$2"]),
            Column::new("available".into(), ["t", "f"]),
        ])
        .expect("calendar");
        let df = normalizer()
            .normalize_table(calendar, &TableSchema::calendar())
            .expect("normalize");

        assert!(df.column("adjusted_price").is_err());
        assert!(df.column("price").is_err());
        let prices = f64_values(&df, "price_num").expect("price_num");
        assert_eq!(prices, vec![Some(1200.0), None]);
        let dates = string_values(&df, "date").expect("date");
        assert_eq!(dates, vec![Some("2024-01-01".to_string()), None]);
        assert_eq!(df.column("minimum_nights").expect("materialized").null_count(), 2);
        assert_eq!(df.column("available").expect("available").dtype(), &DataType::Boolean);
    }

    #[test]
    fn absent_keys_are_not_materialized() {
        let calendar = DataFrame::new(vec![Column::new("date".into(), ["2024-01-01"])])
            .expect("calendar");
        let df = normalizer()
            .normalize_table(calendar, &TableSchema::calendar())
            .expect("normalize");
        assert!(df.column("listing_id").is_err());
    }

    #[test]
    fn nested_text_becomes_lists() {
        let listings = DataFrame::new(vec![
            Column::new("id".into(), ["1", "2", "3"]),
            Column::new(
                "amenities".into(),
                [Some(r#"["Wifi", "Kitchen"]"#), None, Some("Wifi")],
            ),
        ])
        .expect("listings");
        let df = normalizer()
            .normalize_table(listings, &TableSchema::listings())
            .expect("normalize");
        let lists = list_values(&df, "amenities").expect("lists");
        assert_eq!(lists[0].as_ref().map(Vec::len), Some(2));
        assert_eq!(lists[1], Some(Vec::new()));
        assert_eq!(lists[2], Some(vec!["Wifi".to_string()]));
    }
}
