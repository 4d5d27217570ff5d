//! Feature derivation: calendar date parts and price buckets.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use rental_common::{f64_values, string_values};
use rental_model::schema::columns;
use rental_model::{PipelineConfig, Result, TableKind};
use tracing::{info, warn};

use crate::bucket::{Buckets, bucketize};
use crate::normalize::has_column;
use crate::parse::parse_iso_date;
use crate::pipeline::{PipelineState, TransformStage};
use crate::snapshot::Snapshot;

const STAGE: &str = "derive";

pub struct FeatureDeriver {
    config: Arc<PipelineConfig>,
}

impl FeatureDeriver {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn derive(&self, mut snapshot: Snapshot) -> Result<Snapshot> {
        add_date_parts(&mut snapshot.calendar)?;
        add_price_bucket(
            &mut snapshot.calendar,
            &self.config,
            TableKind::Calendar,
            columns::PRICE_NUM,
            columns::DAILY_PRICE_BUCKET,
        )?;
        add_price_bucket(
            &mut snapshot.listings,
            &self.config,
            TableKind::Listings,
            columns::PRICE_NUM,
            columns::PRICE_BUCKET,
        )?;
        Ok(snapshot)
    }
}

impl TransformStage for FeatureDeriver {
    fn run(&self, snapshot: Snapshot, _state: &mut PipelineState) -> Result<Snapshot> {
        self.derive(snapshot)
    }

    fn stage_name(&self) -> &str {
        STAGE
    }
}

/// Writes `bucket` computed from `price`; returns `None` when `price` is absent.
pub(crate) fn add_price_bucket(
    df: &mut DataFrame,
    config: &PipelineConfig,
    table: TableKind,
    price: &str,
    bucket: &str,
) -> Result<Option<Buckets>> {
    if !has_column(df, price) {
        return Ok(None);
    }
    let values = f64_values(df, price)?;
    let buckets = bucketize(
        &values,
        &config.bucketing,
        &config.bucket_labels,
        &config.bucket_fallback,
    );
    if buckets.reduced {
        warn!(
            table = %table,
            column = bucket,
            intervals = buckets.intervals,
            requested = config.bucket_labels.len(),
            "price distribution too narrow for the requested buckets"
        );
    }
    df.with_column(Column::new(bucket.into(), buckets.labels.clone()))?;
    Ok(Some(buckets))
}

/// `(day - 1) / 7 + 1`, so days 1-7 are week 1 and days 29-31 are week 5.
pub fn week_of_month(day: u32) -> u32 {
    (day.saturating_sub(1)) / 7 + 1
}

/// Adds year, month, day, quarter and week-of-month from the calendar date.
fn add_date_parts(calendar: &mut DataFrame) -> Result<()> {
    let height = calendar.height();
    let dates = if has_column(calendar, columns::DATE) {
        string_values(calendar, columns::DATE)?
    } else {
        vec![None; height]
    };
    let parsed: Vec<_> = dates
        .iter()
        .map(|value| value.as_deref().and_then(parse_iso_date))
        .collect();

    let part = |f: &dyn Fn(NaiveDate) -> u32| -> Vec<Option<i32>> {
        parsed
            .iter()
            .map(|date| date.map(|d| f(d) as i32))
            .collect()
    };
    let years: Vec<Option<i32>> = parsed.iter().map(|date| date.map(|d| d.year())).collect();
    let months = part(&|d| d.month());
    let days = part(&|d| d.day());
    let quarters = part(&|d| (d.month() - 1) / 3 + 1);
    let weeks = part(&|d| week_of_month(d.day()));

    let unparsed = parsed.iter().filter(|date| date.is_none()).count();
    calendar.with_column(Column::new(columns::YEAR.into(), years))?;
    calendar.with_column(Column::new(columns::MONTH.into(), months))?;
    calendar.with_column(Column::new(columns::DAY.into(), days))?;
    calendar.with_column(Column::new(columns::QUARTER.into(), quarters))?;
    calendar.with_column(Column::new(columns::WEEK_OF_MONTH.into(), weeks))?;
    if unparsed > 0 {
        warn!(rows = unparsed, "calendar rows without a usable date");
    }
    info!(rows = height, "derived calendar date parts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn deriver() -> FeatureDeriver {
        FeatureDeriver::new(Arc::new(PipelineConfig::default()))
    }

    #[test]
    fn date_parts() {
        let calendar = DataFrame::new(vec![
            Column::new("date".into(), [Some("2024-02-29"), Some("2024-11-08"), None]),
            Column::new("price_num".into(), [Some(10.0), Some(20.0), None]),
        ])
        .expect("calendar");
        let snapshot = Snapshot::new(DataFrame::default(), calendar, DataFrame::default());
        let derived = deriver().derive(snapshot).expect("derive");
        let calendar = derived.calendar;

        let ints = |name: &str| -> Vec<Option<i32>> {
            calendar
                .column(name)
                .expect("column")
                .i32()
                .expect("i32")
                .into_iter()
                .collect()
        };
        assert_eq!(ints("year"), vec![Some(2024), Some(2024), None]);
        assert_eq!(ints("month"), vec![Some(2), Some(11), None]);
        assert_eq!(ints("day"), vec![Some(29), Some(8), None]);
        assert_eq!(ints("quarter"), vec![Some(1), Some(4), None]);
        assert_eq!(ints("week_of_month"), vec![Some(5), Some(2), None]);
    }

    #[test]
    fn listing_bucket_skips_missing_prices() {
        let listings = DataFrame::new(vec![Column::new(
            "price_num".into(),
            [Some(50.0), None, Some(50.0)],
        )])
        .expect("listings");
        let snapshot = Snapshot::new(listings, DataFrame::default(), DataFrame::default());
        let derived = deriver().derive(snapshot).expect("derive");
        assert_eq!(
            string_values(&derived.listings, "price_bucket").expect("bucket"),
            vec![Some("Medium".to_string()), None, Some("Medium".to_string())]
        );
    }

    proptest! {
        #[test]
        fn week_of_month_stays_in_range(day in 1u32..=31) {
            let week = week_of_month(day);
            prop_assert!((1..=5).contains(&week));
        }
    }
}
