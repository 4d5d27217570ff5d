//! Flat-sheet construction.
//!
//! The builder works on copies of the transformed tables:
//!
//! 1. resolve the listing price basis (calendar median, neighbourhood, global)
//!    and recompute the listing price bucket from it
//! 2. fill daily prices from the listing basis
//! 3. derive `booked_night` and `daily_revenue` per calendar day
//! 4. left-join calendar days to the projected listing attributes
//! 5. count reviews per listing-month
//! 6. fill the guaranteed columns and fix the leading column order
//!
//! A calendar without `listing_id` is returned unjoined.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Datelike;
use polars::prelude::*;
use rental_common::{bool_values, f64_values, key_values, median, string_values};
use rental_model::schema::columns;
use rental_model::{ImputationAudit, PipelineConfig, Result, TableKind};
use tracing::{info, warn};

use crate::derive::add_price_bucket;
use crate::expand::NestedFieldExpander;
use crate::normalize::has_column;
use crate::parse::parse_iso_date;
use crate::resolver::FallbackResolver;
use crate::snapshot::Snapshot;

const STAGE: &str = "build";

/// Suffix for listing attributes whose name is already used by the calendar.
const LISTING_SUFFIX: &str = "_listing";

/// Listing attributes carried into the flat sheet, before renames.
const LISTING_COLUMNS: &[&str] = &[
    "id",
    "name",
    "host_id",
    "host_name",
    "host_since",
    "neighbourhood_cleansed",
    "property_type",
    "room_type",
    "accommodates",
    "bedrooms",
    "bathrooms",
    "beds",
    "instant_bookable",
    "latitude",
    "longitude",
    "price_num",
    "price_bucket",
    "review_scores_rating",
    "review_scores_cleanliness",
    "review_scores_accuracy",
    "review_scores_communication",
    "review_scores_checkin",
    "review_scores_location",
    "review_scores_value",
    "reviews_per_month",
    "host_is_superhost",
    "host_identity_verified",
    "host_has_profile_pic",
    "host_response_rate_pct",
    "host_acceptance_rate_pct",
    "host_response_time",
    "host_total_listings_count",
    "availability_30",
    "availability_60",
    "availability_90",
    "availability_365",
    "number_of_reviews",
    "number_of_reviews_ltm",
    "number_of_reviews_l30d",
    "number_of_reviews_ly",
    "first_review",
    "last_review",
];

/// Columns placed first in the flat sheet, in this order.
pub const LEADING_COLUMNS: [&str; 11] = [
    columns::LISTING_ID,
    columns::DATE,
    columns::YEAR,
    columns::MONTH,
    columns::DAY,
    columns::QUARTER,
    columns::PRICE_NUM,
    columns::DAILY_PRICE_BUCKET,
    columns::AVAILABLE,
    columns::BOOKED_NIGHT,
    columns::DAILY_REVENUE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Joined,
    /// The calendar was returned without listing attributes.
    Unjoined { reason: String },
}

#[derive(Debug, Clone)]
pub struct FlatSheet {
    pub frame: DataFrame,
    pub status: BuildStatus,
}

impl FlatSheet {
    pub fn is_joined(&self) -> bool {
        self.status == BuildStatus::Joined
    }
}

pub struct FlatSheetBuilder {
    config: Arc<PipelineConfig>,
}

impl FlatSheetBuilder {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn build(&self, snapshot: &Snapshot, audit: &mut ImputationAudit) -> Result<FlatSheet> {
        let mut listings = snapshot.listings.clone();
        let mut calendar = snapshot.calendar.clone();

        let basis = self.resolve_listing_basis(&mut listings, &calendar, audit)?;
        self.fill_daily_prices(&mut calendar, basis, audit)?;
        add_daily_metrics(&mut calendar)?;

        let missing_key = if !has_column(&calendar, columns::LISTING_ID) {
            Some("calendar has no listing_id column")
        } else if !has_column(&listings, columns::ID) {
            Some("listings have no id column")
        } else {
            None
        };
        if let Some(reason) = missing_key {
            warn!(reason, rows = calendar.height(), "returning calendar without join");
            return Ok(FlatSheet {
                frame: calendar,
                status: BuildStatus::Unjoined {
                    reason: reason.to_string(),
                },
            });
        }

        let dimension = self.project_listings(&listings)?;
        let mut flat = join_listings(&calendar, &dimension)?;
        add_reviews_in_month(&mut flat, &snapshot.reviews)?;
        self.enforce_guarantees(&mut flat, audit)?;
        let frame = reorder(&flat)?;

        info!(rows = frame.height(), columns = frame.width(), "built flat sheet");
        Ok(FlatSheet {
            frame,
            status: BuildStatus::Joined,
        })
    }

    /// Resolves listing `price_num` and recomputes `price_bucket` from it.
    ///
    /// Returns the resolved basis keyed by listing id.
    fn resolve_listing_basis(
        &self,
        listings: &mut DataFrame,
        calendar: &DataFrame,
        audit: &mut ImputationAudit,
    ) -> Result<HashMap<String, f64>> {
        let medians = calendar_price_medians(calendar)?;
        let current = if has_column(listings, columns::PRICE_NUM) {
            f64_values(listings, columns::PRICE_NUM)?
        } else {
            vec![None; listings.height()]
        };
        let resolution = FallbackResolver::new(columns::PRICE_NUM)
            .lookup("calendar", columns::ID, medians)
            .group_by("neighbourhood", &[self.config.neighbourhood_key.as_str()])
            .global("global")
            .or_default("default", 0.0)
            .resolve_values(listings, current)?;

        let [calendar_fills, neighbourhood, global, default] =
            ["calendar", "neighbourhood", "global", "default"].map(|step| resolution.resolved_by(step));
        info!(
            column = columns::PRICE_NUM,
            missing = resolution.initially_missing,
            calendar = calendar_fills,
            neighbourhood,
            global,
            default,
            "resolved listing price basis"
        );
        for step in &resolution.steps {
            audit.record(
                STAGE,
                TableKind::Listings.as_str(),
                columns::PRICE_NUM,
                &step.label,
                step.resolved,
            );
        }

        let ids = if has_column(listings, columns::ID) {
            key_values(listings, columns::ID)?
        } else {
            vec![None; listings.height()]
        };
        let basis = ids
            .into_iter()
            .zip(&resolution.values)
            .filter_map(|(id, value)| Some((id?, (*value)?)))
            .collect();

        listings.with_column(Column::new(columns::PRICE_NUM.into(), resolution.values))?;
        add_price_bucket(
            listings,
            &self.config,
            TableKind::Listings,
            columns::PRICE_NUM,
            columns::PRICE_BUCKET,
        )?;
        let mut buckets = string_values(listings, columns::PRICE_BUCKET)?;
        let filled = fill_blank(&mut buckets, &self.config.bucket_fallback);
        if filled > 0 {
            warn!(
                column = columns::PRICE_BUCKET,
                count = filled,
                label = %self.config.bucket_fallback,
                "price bucket set to fallback label"
            );
            listings.with_column(Column::new(columns::PRICE_BUCKET.into(), buckets))?;
        }
        audit.record(STAGE, TableKind::Listings.as_str(), columns::PRICE_BUCKET, "fallback", filled);
        Ok(basis)
    }

    /// Missing daily prices take the listing basis, then the calendar median.
    fn fill_daily_prices(
        &self,
        calendar: &mut DataFrame,
        basis: HashMap<String, f64>,
        audit: &mut ImputationAudit,
    ) -> Result<()> {
        if !has_column(calendar, columns::PRICE_NUM) {
            return Ok(());
        }
        let resolution = FallbackResolver::new(columns::PRICE_NUM)
            .lookup("listing_basis", columns::LISTING_ID, basis)
            .global("global")
            .resolve(calendar)?;
        if resolution.initially_missing == 0 {
            return Ok(());
        }
        let listing_basis = resolution.resolved_by("listing_basis");
        let global = resolution.resolved_by("global");
        info!(
            column = columns::PRICE_NUM,
            listing_basis,
            global,
            remaining = resolution.remaining(),
            "filled daily prices"
        );
        for step in &resolution.steps {
            audit.record(
                STAGE,
                TableKind::Calendar.as_str(),
                columns::PRICE_NUM,
                &step.label,
                step.resolved,
            );
        }
        calendar.with_column(Column::new(columns::PRICE_NUM.into(), resolution.values))?;
        add_price_bucket(
            calendar,
            &self.config,
            TableKind::Calendar,
            columns::PRICE_NUM,
            columns::DAILY_PRICE_BUCKET,
        )?;
        Ok(())
    }

    /// Allow-listed listing attributes plus indicator columns, with `id` and
    /// `price_num` renamed.
    fn project_listings(&self, listings: &DataFrame) -> Result<DataFrame> {
        let indicators = NestedFieldExpander::new(Arc::clone(&self.config)).indicator_columns();
        let keep: Vec<String> = LISTING_COLUMNS
            .iter()
            .map(|name| (*name).to_string())
            .chain(indicators)
            .filter(|name| has_column(listings, name))
            .collect();
        let mut dimension = listings.select(keep)?;
        dimension.rename(columns::ID, columns::LISTING_ID.into())?;
        if has_column(&dimension, columns::PRICE_NUM) {
            dimension.rename(columns::PRICE_NUM, columns::LISTING_PRICE_NUM.into())?;
        }
        Ok(dimension)
    }

    fn enforce_guarantees(&self, flat: &mut DataFrame, audit: &mut ImputationAudit) -> Result<()> {
        let table = "flat_sheet";
        for anchor in [columns::FIRST_REVIEW, columns::LAST_REVIEW] {
            if !has_column(flat, anchor) {
                continue;
            }
            let mut values = string_values(flat, anchor)?;
            let filled = fill_blank(&mut values, &self.config.date_sentinel);
            flat.with_column(Column::new(anchor.into(), values))?;
            record_guarantee(audit, table, anchor, filled);
        }

        if has_column(flat, columns::LISTING_PRICE_NUM) {
            let mut values = f64_values(flat, columns::LISTING_PRICE_NUM)?;
            let observed: Vec<f64> = values.iter().flatten().copied().collect();
            let fill = median(&observed).unwrap_or(0.0);
            let mut filled = 0;
            for value in values.iter_mut().filter(|v| v.is_none()) {
                *value = Some(fill);
                filled += 1;
            }
            flat.with_column(Column::new(columns::LISTING_PRICE_NUM.into(), values))?;
            record_guarantee(audit, table, columns::LISTING_PRICE_NUM, filled);
        }

        // Fixed bins leave prices outside every bin unlabeled.
        for bucket in [columns::PRICE_BUCKET, columns::DAILY_PRICE_BUCKET] {
            if !has_column(flat, bucket) {
                continue;
            }
            let mut values = string_values(flat, bucket)?;
            let filled = fill_blank(&mut values, &self.config.bucket_fallback);
            flat.with_column(Column::new(bucket.into(), values))?;
            record_guarantee(audit, table, bucket, filled);
        }
        Ok(())
    }
}

/// Median of the observed daily prices per listing.
fn calendar_price_medians(calendar: &DataFrame) -> Result<HashMap<String, f64>> {
    if !has_column(calendar, columns::LISTING_ID) || !has_column(calendar, columns::PRICE_NUM) {
        return Ok(HashMap::new());
    }
    let ids = key_values(calendar, columns::LISTING_ID)?;
    let prices = f64_values(calendar, columns::PRICE_NUM)?;
    let mut observed: HashMap<String, Vec<f64>> = HashMap::new();
    for (id, price) in ids.into_iter().zip(prices) {
        if let (Some(id), Some(price)) = (id, price) {
            observed.entry(id).or_default().push(price);
        }
    }
    Ok(observed
        .into_iter()
        .filter_map(|(id, prices)| median(&prices).map(|m| (id, m)))
        .collect())
}

/// `booked_night = !available`; `daily_revenue = booked_night * price_num`.
///
/// Missing availability counts as available. Revenue is 0 for unbooked
/// days whatever the price.
fn add_daily_metrics(calendar: &mut DataFrame) -> Result<()> {
    let height = calendar.height();
    let available = if has_column(calendar, columns::AVAILABLE) {
        bool_values(calendar, columns::AVAILABLE)?
    } else {
        vec![None; height]
    };
    let booked: Vec<i32> = available
        .iter()
        .map(|value| i32::from(!value.unwrap_or(true)))
        .collect();
    let prices = if has_column(calendar, columns::PRICE_NUM) {
        f64_values(calendar, columns::PRICE_NUM)?
    } else {
        vec![None; height]
    };
    let revenue: Vec<Option<f64>> = booked
        .iter()
        .zip(prices)
        .map(|(booked, price)| {
            if *booked == 0 {
                Some(0.0)
            } else {
                price.map(|p| p * f64::from(*booked))
            }
        })
        .collect();

    let booked_nights: i64 = booked.iter().map(|b| i64::from(*b)).sum();
    calendar.with_column(Column::new(columns::BOOKED_NIGHT.into(), booked))?;
    calendar.with_column(Column::new(columns::DAILY_REVENUE.into(), revenue))?;
    info!(rows = height, booked_nights, "derived daily metrics");
    Ok(())
}

/// Left join on the normalized listing key; the result has one row per
/// calendar row.
fn join_listings(calendar: &DataFrame, dimension: &DataFrame) -> Result<DataFrame> {
    let mut positions: HashMap<String, IdxSize> = HashMap::new();
    for (idx, key) in key_values(dimension, columns::LISTING_ID)?.into_iter().enumerate() {
        if let Some(key) = key {
            positions.entry(key).or_insert(idx as IdxSize);
        }
    }
    let calendar_keys = key_values(calendar, columns::LISTING_ID)?;
    let indices: Vec<Option<IdxSize>> = calendar_keys
        .iter()
        .map(|key| key.as_ref().and_then(|key| positions.get(key).copied()))
        .collect();
    let matched = indices.iter().filter(|idx| idx.is_some()).count();

    let height = calendar.height();
    let attributes: Vec<Column> = if matched == 0 {
        dimension
            .get_columns()
            .iter()
            .map(|column| Column::full_null(column.name().clone(), height, column.dtype()))
            .collect()
    } else {
        let idx = IdxCa::from_iter_options("idx".into(), indices.into_iter());
        dimension.take(&idx)?.get_columns().to_vec()
    };

    let mut added = Vec::with_capacity(attributes.len());
    for mut column in attributes {
        if column.name().as_str() == columns::LISTING_ID {
            continue;
        }
        if has_column(calendar, column.name().as_str()) {
            let renamed = format!("{}{LISTING_SUFFIX}", column.name());
            column.rename(renamed.into());
        }
        added.push(column);
    }

    // The calendar key column is replaced by its normalized form.
    let mut base = calendar.clone();
    base.with_column(Column::new(columns::LISTING_ID.into(), calendar_keys))?;
    let flat = base.hstack(&added)?;
    info!(
        calendar_rows = height,
        rows = flat.height(),
        matched,
        unmatched = height - matched,
        listing_columns = added.len(),
        "joined calendar to listings"
    );
    if matched < height {
        warn!(rows = height - matched, "calendar rows without a matching listing");
    }
    Ok(flat)
}

/// Review counts per `(listing_id, year, month)`; absent counts are 0.
fn add_reviews_in_month(flat: &mut DataFrame, reviews: &DataFrame) -> Result<()> {
    let height = flat.height();
    let mut counts: HashMap<(String, i32, u32), i64> = HashMap::new();
    if has_column(reviews, columns::LISTING_ID) && has_column(reviews, columns::DATE) {
        let ids = key_values(reviews, columns::LISTING_ID)?;
        let dates = string_values(reviews, columns::DATE)?;
        for (id, date) in ids.into_iter().zip(dates) {
            let Some(id) = id else { continue };
            let Some(date) = date.as_deref().and_then(parse_iso_date) else {
                continue;
            };
            *counts.entry((id, date.year(), date.month())).or_default() += 1;
        }
    }

    let values: Vec<i64> = if counts.is_empty()
        || !has_column(flat, columns::YEAR)
        || !has_column(flat, columns::MONTH)
    {
        vec![0; height]
    } else {
        let ids = key_values(flat, columns::LISTING_ID)?;
        let years = f64_values(flat, columns::YEAR)?;
        let months = f64_values(flat, columns::MONTH)?;
        ids.into_iter()
            .zip(years)
            .zip(months)
            .map(|((id, year), month)| match (id, year, month) {
                (Some(id), Some(year), Some(month)) => counts
                    .get(&(id, year as i32, month as u32))
                    .copied()
                    .unwrap_or(0),
                _ => 0,
            })
            .collect()
    };
    let with_reviews = values.iter().filter(|v| **v > 0).count();
    flat.with_column(Column::new(columns::REVIEWS_IN_MONTH.into(), values))?;
    info!(
        groups = counts.len(),
        rows_with_reviews = with_reviews,
        "aggregated reviews per listing-month"
    );
    Ok(())
}

fn reorder(flat: &DataFrame) -> Result<DataFrame> {
    let names: Vec<String> = flat
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let mut order: Vec<String> = LEADING_COLUMNS
        .iter()
        .filter(|name| names.iter().any(|n| n == *name))
        .map(|name| (*name).to_string())
        .collect();
    order.extend(
        names
            .into_iter()
            .filter(|name| !LEADING_COLUMNS.contains(&name.as_str())),
    );
    Ok(flat.select(order)?)
}

fn fill_blank(values: &mut [Option<String>], fill: &str) -> usize {
    let mut filled = 0;
    for value in values.iter_mut() {
        if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
            *value = Some(fill.to_string());
            filled += 1;
        }
    }
    filled
}

fn record_guarantee(audit: &mut ImputationAudit, table: &str, column: &str, filled: usize) {
    if filled > 0 {
        info!(column, count = filled, "filled guaranteed column");
    }
    audit.record(STAGE, table, column, "guarantee", filled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rental_model::BucketingMode;

    fn builder() -> FlatSheetBuilder {
        FlatSheetBuilder::new(Arc::new(PipelineConfig::default()))
    }

    fn calendar() -> DataFrame {
        DataFrame::new(vec![
            Column::new("listing_id".into(), ["1", "1", "2"]),
            Column::new("date".into(), ["2024-01-05", "2024-02-05", "2024-01-06"]),
            Column::new("year".into(), [2024i32, 2024, 2024]),
            Column::new("month".into(), [1i32, 2, 1]),
            Column::new("available".into(), [false, true, false]),
            Column::new("price_num".into(), [Some(100.0), Some(120.0), None]),
        ])
        .expect("calendar")
    }

    fn listings() -> DataFrame {
        DataFrame::new(vec![
            Column::new("id".into(), ["1", "2"]),
            Column::new("neighbourhood_cleansed".into(), ["A", "A"]),
            Column::new("price_num".into(), [Some(90.0), None]),
            Column::new("first_review".into(), ["2023-01-01", "2023-05-01"]),
            Column::new("last_review".into(), ["2024-01-01", "2024-01-02"]),
        ])
        .expect("listings")
    }

    #[test]
    fn daily_metrics_follow_availability() {
        let mut df = DataFrame::new(vec![
            Column::new("available".into(), [Some(false), Some(true), None]),
            Column::new("price_num".into(), [Some(80.0), None, None]),
        ])
        .expect("calendar");
        add_daily_metrics(&mut df).expect("metrics");
        let booked: Vec<Option<i32>> = df
            .column("booked_night")
            .expect("booked")
            .i32()
            .expect("i32")
            .into_iter()
            .collect();
        assert_eq!(booked, vec![Some(1), Some(0), Some(0)]);
        assert_eq!(
            f64_values(&df, "daily_revenue").expect("revenue"),
            vec![Some(80.0), Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn join_keeps_calendar_rows_and_leads_with_daily_columns() {
        let snapshot = Snapshot::new(listings(), calendar(), DataFrame::default());
        let mut audit = ImputationAudit::new();
        let sheet = builder().build(&snapshot, &mut audit).expect("build");
        assert!(sheet.is_joined());
        assert_eq!(sheet.frame.height(), 3);

        let names: Vec<String> = sheet
            .frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names[0], "listing_id");
        assert_eq!(names[1], "date");
        assert!(names.contains(&"listing_price_num".to_string()));
        assert!(!names.contains(&"id".to_string()));

        // Listing 2 has neither a catalog price nor an observed daily price.
        let basis = f64_values(&sheet.frame, "listing_price_num").expect("basis");
        assert_eq!(basis, vec![Some(90.0), Some(90.0), Some(90.0)]);
        assert_eq!(audit.count_for("price_num", "neighbourhood"), 1);
        assert_eq!(
            f64_values(&sheet.frame, "reviews_in_month").expect("reviews"),
            vec![Some(0.0), Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn calendar_without_key_is_returned_unjoined() {
        let calendar = calendar().drop("listing_id").expect("drop");
        let snapshot = Snapshot::new(listings(), calendar, DataFrame::default());
        let sheet = builder()
            .build(&snapshot, &mut ImputationAudit::new())
            .expect("build");
        assert!(!sheet.is_joined());
        assert_eq!(sheet.frame.height(), 3);
        assert!(sheet.frame.column("booked_night").is_ok());
    }

    #[test]
    fn unmatched_listing_rows_get_guaranteed_values() {
        let calendar = DataFrame::new(vec![
            Column::new("listing_id".into(), ["1", "99"]),
            Column::new("date".into(), ["2024-01-05", "2024-01-06"]),
            Column::new("available".into(), [true, true]),
            Column::new("price_num".into(), [50.0, 60.0]),
        ])
        .expect("calendar");
        let snapshot = Snapshot::new(listings(), calendar, DataFrame::default());
        let sheet = builder()
            .build(&snapshot, &mut ImputationAudit::new())
            .expect("build");
        let frame = &sheet.frame;
        assert_eq!(
            string_values(frame, "first_review").expect("first_review")[1].as_deref(),
            Some("1970-01-01")
        );
        assert_eq!(
            string_values(frame, "price_bucket").expect("bucket")[1].as_deref(),
            Some("Medium")
        );
        assert_eq!(frame.column("listing_price_num").expect("basis").null_count(), 0);
    }

    #[test]
    fn prices_outside_fixed_bins_get_the_fallback_bucket() {
        let config = PipelineConfig::default().with_bucketing(BucketingMode::Fixed {
            bins: vec![0.0, 100.0],
            labels: vec!["Budget".to_string()],
        });
        let calendar = DataFrame::new(vec![
            Column::new("listing_id".into(), ["1", "1"]),
            Column::new("date".into(), ["2024-01-05", "2024-01-06"]),
            Column::new("available".into(), [true, false]),
            Column::new("price_num".into(), [500.0, 50.0]),
            Column::new("daily_price_bucket".into(), [None, Some("Budget")]),
        ])
        .expect("calendar");
        let snapshot = Snapshot::new(listings(), calendar, DataFrame::default());
        let mut audit = ImputationAudit::new();
        let sheet = FlatSheetBuilder::new(Arc::new(config))
            .build(&snapshot, &mut audit)
            .expect("build");

        let daily = string_values(&sheet.frame, "daily_price_bucket").expect("daily bucket");
        assert_eq!(daily, vec![Some("Medium".to_string()), Some("Budget".to_string())]);
        assert_eq!(audit.count_for("daily_price_bucket", "guarantee"), 1);
    }
}
