//! Cascading null imputation.
//!
//! Field classes come from the table schemas. Each class has its own cascade
//! (see [`FallbackResolver`]); a type-driven safety net runs last so that no
//! nulls survive the stage. Prices (listing basis and daily price) are left
//! to the flat-sheet builder, which has calendar evidence for them.
//!
//! | Role | Cascade | Post-step |
//! |---|---|---|
//! | Rate | host, group, global median | clip to bounds |
//! | Score | group, neighbourhood, global median | winsorize |
//! | Coordinate | neighbourhood, global median | |
//! | Counter | group, global median | floor, clamp at 0, integer |
//! | ReviewActivity | 0.0 | |
//! | Flag | false | |
//! | Availability | true | |
//! | Categorical | mode, else unknown label | |
//! | Date with companion | companion, then sentinel | |

use std::collections::HashSet;
use std::sync::Arc;

use polars::prelude::*;
use rental_common::stats::{quantile_sorted, sorted_finite};
use rental_common::{bool_values, f64_values, key_values, median, mode, string_values};
use rental_model::schema::columns;
use rental_model::{
    ColumnRole, ImputationAudit, PipelineConfig, Result, TableKind, TableSchema,
};
use tracing::{info, warn};

use crate::normalize::has_column;
use crate::parse::leading_number;
use crate::pipeline::{PipelineState, TransformStage};
use crate::resolver::{FallbackResolver, Resolution};
use crate::snapshot::Snapshot;

const STAGE: &str = "impute";

pub struct NullImputer {
    config: Arc<PipelineConfig>,
}

impl NullImputer {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn impute(&self, snapshot: Snapshot, audit: &mut ImputationAudit) -> Result<Snapshot> {
        let listings = self.impute_listings(snapshot.listings, audit)?;
        let calendar = self.impute_calendar(snapshot.calendar, audit)?;
        let reviews = self.impute_reviews(snapshot.reviews, audit)?;
        Ok(Snapshot::new(listings, calendar, reviews))
    }

    pub fn impute_listings(&self, df: DataFrame, audit: &mut ImputationAudit) -> Result<DataFrame> {
        let schema = TableSchema::listings();
        let mut df = protect_keys(df, &schema, audit)?;
        self.standardize_na_tokens(&mut df, &schema)?;
        apply_text_defaults(&mut df, &schema, audit)?;
        add_missingness_flags(&mut df, &schema)?;

        let group_keys: Vec<&str> = self.config.group_keys.iter().map(String::as_str).collect();
        let neighbourhood = self.config.neighbourhood_key.as_str();
        let host = self.config.host_key.as_str();

        for column in schema.names_with_role(ColumnRole::Rate) {
            let resolver = FallbackResolver::new(column)
                .group_by("host", &[host])
                .group_by("group", &group_keys)
                .global("global");
            let Some(mut resolution) = run_resolver(&df, &resolver, audit)? else {
                continue;
            };
            let (low, high) = self.config.rate_bounds;
            clip(&mut resolution.values, low, high);
            write_f64(&mut df, column, resolution.values)?;
        }

        for column in schema.names_with_role(ColumnRole::Score) {
            let resolver = FallbackResolver::new(column)
                .group_by("group", &group_keys)
                .group_by("neighbourhood", &[neighbourhood])
                .global("global");
            let Some(mut resolution) = run_resolver(&df, &resolver, audit)? else {
                continue;
            };
            let (lower_q, upper_q) = self.config.score_winsor;
            let sorted = sorted_finite(&resolution.values.iter().flatten().copied().collect::<Vec<_>>());
            if let (Some(low), Some(high)) = (
                quantile_sorted(&sorted, lower_q),
                quantile_sorted(&sorted, upper_q),
            ) {
                clip(&mut resolution.values, low, high);
            }
            write_f64(&mut df, column, resolution.values)?;
        }

        for column in schema.names_with_role(ColumnRole::ReviewActivity) {
            if !has_column(&df, column) {
                continue;
            }
            let mut values = f64_values(&df, column)?;
            let filled = fill_missing(&mut values, 0.0);
            log_fill(audit, TableKind::Listings, column, "zero", filled);
            write_f64(&mut df, column, values)?;
        }

        for column in schema.names_with_role(ColumnRole::Coordinate) {
            let resolver = FallbackResolver::new(column)
                .group_by("neighbourhood", &[neighbourhood])
                .global("global");
            let Some(resolution) = run_resolver(&df, &resolver, audit)? else {
                continue;
            };
            write_f64(&mut df, column, resolution.values)?;
        }

        self.fill_measures_from_companions(&mut df, &schema, audit)?;

        for column in schema.names_with_role(ColumnRole::Counter) {
            let resolver = FallbackResolver::new(column)
                .group_by("group", &group_keys)
                .global("global");
            let Some(resolution) = run_resolver(&df, &resolver, audit)? else {
                continue;
            };
            let counts: Vec<Option<i64>> = resolution
                .values
                .into_iter()
                .map(|value| value.map(|v| v.floor().max(0.0) as i64))
                .collect();
            df.with_column(Column::new(column.into(), counts))?;
        }

        fill_flags(&mut df, &schema, ColumnRole::Flag, false, audit)?;

        for column in schema.names_with_role(ColumnRole::Categorical) {
            if !has_column(&df, column) {
                continue;
            }
            let mut values = string_values(&df, column)?;
            let fallback = mode(values.iter().flatten().map(String::as_str))
                .unwrap_or_else(|| self.config.unknown_label.clone());
            let filled = fill_missing(&mut values, fallback);
            log_fill(audit, TableKind::Listings, column, "mode", filled);
            df.with_column(Column::new(column.into(), values))?;
        }

        self.fill_dates_from_companions(&mut df, &schema, audit)?;

        let excluded = [columns::PRICE_NUM];
        let df = self.safety_net(df, &schema, &excluded, audit)?;
        info!(table = "listings", rows = df.height(), columns = df.width(), "imputed table");
        Ok(df)
    }

    pub fn impute_calendar(&self, mut df: DataFrame, audit: &mut ImputationAudit) -> Result<DataFrame> {
        let schema = TableSchema::calendar();
        fill_flags(&mut df, &schema, ColumnRole::Availability, true, audit)?;
        // Daily prices stay sparse; the flat-sheet builder fills them from the listing basis.
        let excluded = [columns::PRICE_NUM];
        let df = self.safety_net(df, &schema, &excluded, audit)?;
        info!(table = "calendar", rows = df.height(), columns = df.width(), "imputed table");
        Ok(df)
    }

    pub fn impute_reviews(&self, df: DataFrame, audit: &mut ImputationAudit) -> Result<DataFrame> {
        let schema = TableSchema::reviews();
        let mut df = protect_keys(df, &schema, audit)?;
        apply_text_defaults(&mut df, &schema, audit)?;
        let df = self.safety_net(df, &schema, &[], audit)?;
        info!(table = "reviews", rows = df.height(), columns = df.width(), "imputed table");
        Ok(df)
    }

    /// Listing text values matching an NA token become null.
    fn standardize_na_tokens(&self, df: &mut DataFrame, schema: &TableSchema) -> Result<()> {
        let text_columns = schema
            .columns
            .iter()
            .filter(|spec| matches!(spec.role, ColumnRole::Text | ColumnRole::Categorical))
            .map(|spec| spec.name());
        for column in text_columns {
            if !has_column(df, column) {
                continue;
            }
            let mut replaced = 0usize;
            let values: Vec<Option<String>> = string_values(df, column)?
                .into_iter()
                .map(|value| match value {
                    Some(v) if self.config.is_na_token(&v) => {
                        replaced += 1;
                        None
                    }
                    other => other,
                })
                .collect();
            if replaced > 0 {
                df.with_column(Column::new(column.into(), values))?;
            }
        }
        Ok(())
    }

    /// Numeric measures read from a companion text column, then the declared default.
    fn fill_measures_from_companions(
        &self,
        df: &mut DataFrame,
        schema: &TableSchema,
        audit: &mut ImputationAudit,
    ) -> Result<()> {
        for spec in &schema.columns {
            if spec.role != ColumnRole::Measure || !has_column(df, spec.name()) {
                continue;
            }
            let column = spec.name();
            let mut values = f64_values(df, column)?;
            let mut from_companion = 0;
            if let Some(companion) = spec.companion.as_deref().filter(|c| has_column(df, c)) {
                let texts = string_values(df, companion)?;
                for (value, text) in values.iter_mut().zip(texts) {
                    if value.is_none() {
                        *value = text.as_deref().and_then(leading_number);
                        from_companion += usize::from(value.is_some());
                    }
                }
            }
            let mut from_default = 0;
            if let Some(default) = spec.default.as_deref().and_then(rental_common::parse_f64) {
                from_default = fill_missing(&mut values, default);
                if from_default > 0 {
                    warn!(column, count = from_default, default, "no source value, using default");
                }
            }
            if from_companion > 0 {
                info!(column, count = from_companion, "filled from companion text");
            }
            audit.record(STAGE, schema.kind.as_str(), column, "companion", from_companion);
            audit.record(STAGE, schema.kind.as_str(), column, "default", from_default);
            write_f64(df, column, values)?;
        }
        Ok(())
    }

    /// Dates copied from a companion date column, then the role's sentinel.
    fn fill_dates_from_companions(
        &self,
        df: &mut DataFrame,
        schema: &TableSchema,
        audit: &mut ImputationAudit,
    ) -> Result<()> {
        for spec in &schema.columns {
            let sentinel = match spec.role {
                ColumnRole::Date => &self.config.date_sentinel,
                ColumnRole::Timestamp => &self.config.timestamp_sentinel,
                _ => continue,
            };
            let Some(companion) = spec.companion.as_deref() else {
                continue;
            };
            let column = spec.name();
            if !has_column(df, column) {
                continue;
            }
            let mut values = string_values(df, column)?;
            let companions = if has_column(df, companion) {
                string_values(df, companion)?
            } else {
                vec![None; values.len()]
            };
            let mut from_companion = 0;
            for (value, other) in values.iter_mut().zip(companions) {
                if is_blank(value.as_deref()) && !is_blank(other.as_deref()) {
                    *value = other;
                    from_companion += 1;
                }
            }
            let mut from_sentinel = 0;
            for value in values.iter_mut().filter(|v| is_blank(v.as_deref())) {
                *value = Some(sentinel.clone());
                from_sentinel += 1;
            }
            info!(column, companion, from_companion, sentinel = from_sentinel, "filled dates");
            audit.record(STAGE, schema.kind.as_str(), column, companion, from_companion);
            audit.record(STAGE, schema.kind.as_str(), column, "sentinel", from_sentinel);
            df.with_column(Column::new(column.into(), values))?;
        }
        Ok(())
    }

    /// Fills every remaining null by dtype.
    ///
    /// Numbers take the column median (0 when nothing is observed), booleans
    /// false, lists the empty list, and strings the date sentinel for date
    /// roles or the unknown label otherwise.
    pub fn safety_net(
        &self,
        mut df: DataFrame,
        schema: &TableSchema,
        excluded: &[&str],
        audit: &mut ImputationAudit,
    ) -> Result<DataFrame> {
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let mut touched = Vec::new();
        for name in names {
            if excluded.contains(&name.as_str()) {
                continue;
            }
            let column = df.column(&name)?;
            let nulls = column.null_count();
            if nulls == 0 {
                continue;
            }
            let dtype = column.dtype().clone();
            let filled = match dtype {
                DataType::Boolean => {
                    let values: Vec<bool> = bool_values(&df, &name)?
                        .into_iter()
                        .map(|v| v.unwrap_or(false))
                        .collect();
                    Column::new(name.as_str().into(), values)
                }
                DataType::List(_) => {
                    let values: Vec<Vec<String>> = rental_common::list_values(&df, &name)?
                        .into_iter()
                        .map(Option::unwrap_or_default)
                        .collect();
                    rental_common::list_column(&name, &values)
                }
                DataType::String => {
                    let fallback = match schema.role_of(&name) {
                        Some(ColumnRole::Date) => self.config.date_sentinel.clone(),
                        Some(ColumnRole::Timestamp) => self.config.timestamp_sentinel.clone(),
                        _ => self.config.unknown_label.clone(),
                    };
                    let mut values = string_values(&df, &name)?;
                    fill_missing(&mut values, fallback);
                    Column::new(name.as_str().into(), values)
                }
                DataType::Float32 | DataType::Float64 => {
                    let mut values = f64_values(&df, &name)?;
                    let observed: Vec<f64> = values.iter().flatten().copied().collect();
                    fill_missing(&mut values, median(&observed).unwrap_or(0.0));
                    Column::new(name.as_str().into(), values)
                }
                DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64 => {
                    let mut values = f64_values(&df, &name)?;
                    let observed: Vec<f64> = values.iter().flatten().copied().collect();
                    fill_missing(&mut values, median(&observed).unwrap_or(0.0).round());
                    let ints: Vec<Option<i64>> =
                        values.into_iter().map(|v| v.map(|v| v as i64)).collect();
                    Column::new(name.as_str().into(), ints).cast(&dtype)?
                }
                _ => {
                    let mut values = string_values(&df, &name)?;
                    fill_missing(&mut values, self.config.unknown_label.clone());
                    Column::new(name.as_str().into(), values)
                }
            };
            df.with_column(filled)?;
            audit.record(STAGE, schema.kind.as_str(), &name, "safety_net", nulls);
            touched.push(format!("{name}={nulls}"));
        }
        if !touched.is_empty() {
            info!(table = %schema.kind, columns = ?touched, "safety net filled remaining nulls");
        }
        Ok(df)
    }
}

impl TransformStage for NullImputer {
    fn run(&self, snapshot: Snapshot, state: &mut PipelineState) -> Result<Snapshot> {
        self.impute(snapshot, &mut state.audit)
    }

    fn stage_name(&self) -> &str {
        STAGE
    }
}

/// Drops rows with missing keys (when the table protects them) and
/// duplicate listing identifiers, keeping the first occurrence.
fn protect_keys(df: DataFrame, schema: &TableSchema, audit: &mut ImputationAudit) -> Result<DataFrame> {
    if !schema.kind.protects_keys() {
        return Ok(df);
    }
    let height = df.height();
    let mut keep = vec![true; height];
    for key in schema.key_columns() {
        if !has_column(&df, key) {
            continue;
        }
        let values = string_values(&df, key)?;
        let mut dropped = 0;
        for (flag, value) in keep.iter_mut().zip(&values) {
            if *flag && is_blank(value.as_deref()) {
                *flag = false;
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(table = %schema.kind, key, dropped, "dropped rows missing key");
        }
        audit.record(STAGE, schema.kind.as_str(), key, "dropped", dropped);
    }

    if schema.kind == TableKind::Listings && has_column(&df, columns::ID) {
        let ids = key_values(&df, columns::ID)?;
        let mut seen = HashSet::new();
        let mut duplicates = 0;
        for (flag, id) in keep.iter_mut().zip(ids) {
            let Some(id) = id else { continue };
            if *flag && !seen.insert(id) {
                *flag = false;
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warn!(table = %schema.kind, duplicates, "dropped duplicate listing ids");
        }
        audit.record(STAGE, schema.kind.as_str(), columns::ID, "duplicate", duplicates);
    }

    if keep.iter().all(|flag| *flag) {
        return Ok(df);
    }
    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    Ok(df.filter(&mask)?)
}

/// Declared literal defaults for text columns.
fn apply_text_defaults(df: &mut DataFrame, schema: &TableSchema, audit: &mut ImputationAudit) -> Result<()> {
    for spec in &schema.columns {
        let Some(default) = spec.default.as_deref() else {
            continue;
        };
        if !matches!(spec.role, ColumnRole::Text | ColumnRole::Categorical) || !has_column(df, spec.name()) {
            continue;
        }
        let column = spec.name();
        let mut values = string_values(df, column)?;
        let filled = fill_missing(&mut values, default.to_string());
        log_fill(audit, schema.kind, column, "default", filled);
        df.with_column(Column::new(column.into(), values))?;
    }
    Ok(())
}

/// Adds `{column}_was_missing` (0/1) for roles that track missingness.
fn add_missingness_flags(df: &mut DataFrame, schema: &TableSchema) -> Result<()> {
    for spec in &schema.columns {
        if !spec.role.tracks_missingness() || !has_column(df, spec.name()) {
            continue;
        }
        let column = spec.name();
        let flags: Vec<i32> = f64_values(df, column)?
            .into_iter()
            .map(|value| i32::from(value.is_none()))
            .collect();
        df.with_column(Column::new(format!("{column}_was_missing").into(), flags))?;
    }
    Ok(())
}

fn fill_flags(
    df: &mut DataFrame,
    schema: &TableSchema,
    role: ColumnRole,
    default: bool,
    audit: &mut ImputationAudit,
) -> Result<()> {
    for column in schema.names_with_role(role) {
        if !has_column(df, column) {
            continue;
        }
        let mut values = bool_values(df, column)?;
        let filled = fill_missing(&mut values, default);
        log_fill(audit, schema.kind, column, "default", filled);
        df.with_column(Column::new(column.into(), values))?;
    }
    Ok(())
}

fn run_resolver(
    df: &DataFrame,
    resolver: &FallbackResolver,
    audit: &mut ImputationAudit,
) -> Result<Option<Resolution>> {
    let column = resolver.column();
    if !has_column(df, column) {
        return Ok(None);
    }
    let resolution = resolver.resolve(df)?;
    let summary: Vec<String> = resolution
        .steps
        .iter()
        .map(|step| format!("{}={}", step.label, step.resolved))
        .collect();
    info!(
        column,
        missing = resolution.initially_missing,
        steps = %summary.join(" "),
        "resolved cascade"
    );
    for step in &resolution.steps {
        audit.record(STAGE, TableKind::Listings.as_str(), column, &step.label, step.resolved);
    }
    Ok(Some(resolution))
}

fn write_f64(df: &mut DataFrame, column: &str, values: Vec<Option<f64>>) -> Result<()> {
    df.with_column(Column::new(column.into(), values))?;
    Ok(())
}

fn clip(values: &mut [Option<f64>], low: f64, high: f64) {
    for value in values.iter_mut().flatten() {
        *value = value.clamp(low, high);
    }
}

fn fill_missing<T: Clone>(values: &mut [Option<T>], fill: T) -> usize {
    let mut filled = 0;
    for value in values.iter_mut().filter(|v| v.is_none()) {
        *value = Some(fill.clone());
        filled += 1;
    }
    filled
}

fn log_fill(audit: &mut ImputationAudit, table: TableKind, column: &str, step: &str, count: usize) {
    if count > 0 {
        info!(table = %table, column, step, count, "filled missing values");
    }
    audit.record(STAGE, table.as_str(), column, step, count);
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imputer() -> NullImputer {
        NullImputer::new(Arc::new(PipelineConfig::default()))
    }

    #[test]
    fn reviews_missing_keys_are_dropped() {
        let reviews = DataFrame::new(vec![
            Column::new("listing_id".into(), [Some("1"), None, Some("1")]),
            Column::new("id".into(), [Some("r1"), Some("r2"), Some("r3")]),
            Column::new("date".into(), [Some("2024-01-02"), Some("2024-01-03"), None]),
            Column::new("reviewer_name".into(), [None::<&str>, None, None]),
            Column::new("comments".into(), [None::<&str>, None, None]),
            Column::new("reviewer_id".into(), [Some("u1"), Some("u2"), Some("u3")]),
        ])
        .expect("reviews");
        let mut audit = ImputationAudit::new();
        let df = imputer().impute_reviews(reviews, &mut audit).expect("impute");
        assert_eq!(df.height(), 1);
        assert_eq!(
            string_values(&df, "reviewer_name").expect("names"),
            vec![Some("unknown".to_string())]
        );
        assert_eq!(string_values(&df, "comments").expect("comments"), vec![Some(String::new())]);
        assert_eq!(audit.count_for("listing_id", "dropped"), 1);
        assert_eq!(audit.count_for("date", "dropped"), 1);
    }

    #[test]
    fn calendar_availability_defaults_to_true() {
        let calendar = DataFrame::new(vec![
            Column::new("listing_id".into(), ["1", "1"]),
            Column::new("available".into(), [Some(false), None]),
            Column::new("price_num".into(), [Some(100.0), None]),
        ])
        .expect("calendar");
        let mut audit = ImputationAudit::new();
        let df = imputer().impute_calendar(calendar, &mut audit).expect("impute");
        assert_eq!(
            bool_values(&df, "available").expect("available"),
            vec![Some(false), Some(true)]
        );
        assert_eq!(
            f64_values(&df, "price_num").expect("price"),
            vec![Some(100.0), None]
        );
    }

    #[test]
    fn safety_net_respects_exclusions_and_roles() {
        let df = DataFrame::new(vec![
            Column::new("price_num".into(), [Some(1.0), None]),
            Column::new("host_since".into(), [Some("2020-01-01"), None]),
            Column::new("misc".into(), [None::<&str>, Some("x")]),
            Column::new("count".into(), [Some(2i64), None]),
        ])
        .expect("frame");
        let mut audit = ImputationAudit::new();
        let df = imputer()
            .safety_net(df, &TableSchema::listings(), &["price_num"], &mut audit)
            .expect("safety net");
        assert_eq!(df.column("price_num").expect("price").null_count(), 1);
        assert_eq!(
            string_values(&df, "host_since").expect("host_since")[1].as_deref(),
            Some("1970-01-01")
        );
        assert_eq!(string_values(&df, "misc").expect("misc")[0].as_deref(), Some("unknown"));
        assert_eq!(df.column("count").expect("count").dtype(), &DataType::Int64);
        assert_eq!(audit.count_for("misc", "safety_net"), 1);
    }
}
