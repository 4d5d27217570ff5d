//! Declared table schemas.
//!
//! Every stage of the transform looks columns up through a [`TableSchema`]
//! instead of probing the frame ad hoc. A column's [`ColumnRole`] decides how
//! it is parsed during normalization, which imputation cascade fills it, and
//! which dtype it carries once the stage that owns it has run.

use std::fmt;

use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};

/// Fixed column names that the transform refers to directly.
pub mod columns {
    pub const ID: &str = "id";
    pub const HOST_ID: &str = "host_id";
    pub const LISTING_ID: &str = "listing_id";
    pub const DATE: &str = "date";
    pub const AVAILABLE: &str = "available";
    pub const PRICE_NUM: &str = "price_num";
    pub const LISTING_PRICE_NUM: &str = "listing_price_num";
    pub const PRICE_BUCKET: &str = "price_bucket";
    pub const DAILY_PRICE_BUCKET: &str = "daily_price_bucket";
    pub const FIRST_REVIEW: &str = "first_review";
    pub const LAST_REVIEW: &str = "last_review";
    pub const LAST_SCRAPED: &str = "last_scraped";
    pub const BATHROOMS: &str = "bathrooms";
    pub const BATHROOMS_TEXT: &str = "bathrooms_text";
    pub const AMENITIES: &str = "amenities";
    pub const HOST_VERIFICATIONS: &str = "host_verifications";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const DAY: &str = "day";
    pub const QUARTER: &str = "quarter";
    pub const WEEK_OF_MONTH: &str = "week_of_month";
    pub const BOOKED_NIGHT: &str = "booked_night";
    pub const DAILY_REVENUE: &str = "daily_revenue";
    pub const REVIEWS_IN_MONTH: &str = "reviews_in_month";
}

/// Semantic role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Record key, kept as a normalized string and never imputed.
    Identifier,
    /// Currency text parsed to a float quantity.
    Price,
    /// Percentage text parsed to a float, host cascade, clipped to `[0, 100]`.
    Rate,
    /// Quality score, group cascade then winsorized.
    Score,
    /// Latitude or longitude, neighbourhood cascade.
    Coordinate,
    /// Capacity or availability counter, group cascade then cast to integer.
    Counter,
    /// Plain float filled by the safety net median.
    Measure,
    /// Review activity rate; missing means no activity.
    ReviewActivity,
    /// Boolean flag, missing means false.
    Flag,
    /// Calendar availability, missing means available.
    Availability,
    /// Low-cardinality label filled with the most frequent value.
    Categorical,
    /// Free text.
    Text,
    /// Calendar date rendered as `YYYY-MM-DD`.
    Date,
    /// Instant rendered as `YYYY-MM-DDTHH:MM:SSZ`.
    Timestamp,
    /// List of strings.
    NestedList,
}

impl ColumnRole {
    /// Dtype the column carries after normalization.
    pub fn normalized_dtype(self) -> DataType {
        match self {
            ColumnRole::Price
            | ColumnRole::Rate
            | ColumnRole::Score
            | ColumnRole::Coordinate
            | ColumnRole::Counter
            | ColumnRole::Measure
            | ColumnRole::ReviewActivity => DataType::Float64,
            ColumnRole::Flag | ColumnRole::Availability => DataType::Boolean,
            ColumnRole::NestedList => DataType::List(Box::new(DataType::String)),
            ColumnRole::Identifier
            | ColumnRole::Categorical
            | ColumnRole::Text
            | ColumnRole::Date
            | ColumnRole::Timestamp => DataType::String,
        }
    }

    /// Roles whose original missingness is preserved in a `{name}_was_missing` column.
    pub fn tracks_missingness(self) -> bool {
        matches!(
            self,
            ColumnRole::Rate
                | ColumnRole::Score
                | ColumnRole::Coordinate
                | ColumnRole::ReviewActivity
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Listings,
    Calendar,
    Reviews,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Listings => "listings",
            TableKind::Calendar => "calendar",
            TableKind::Reviews => "reviews",
        }
    }

    /// Whether rows with a missing key value are dropped.
    ///
    /// Calendar rows are never dropped so the flat sheet keeps one row per day.
    pub fn protects_keys(self) -> bool {
        !matches!(self, TableKind::Calendar)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Name in the source collection.
    pub source: String,
    /// Name after normalization, when it differs from `source`.
    pub renamed: Option<String>,
    pub role: ColumnRole,
    /// Identity column. Never materialized when absent; tables that protect
    /// their keys drop rows missing it.
    pub key: bool,
    /// Literal used for missing values instead of the role default.
    pub default: Option<String>,
    /// Column consulted for missing values before the default applies.
    pub companion: Option<String>,
}

impl ColumnSpec {
    pub fn new(source: &str, role: ColumnRole) -> Self {
        Self {
            source: source.to_string(),
            renamed: None,
            role,
            key: false,
            default: None,
            companion: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn renamed(mut self, name: &str) -> Self {
        self.renamed = Some(name.to_string());
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn with_companion(mut self, column: &str) -> Self {
        self.companion = Some(column.to_string());
        self
    }

    /// Name of the column once normalization has run.
    pub fn name(&self) -> &str {
        self.renamed.as_deref().unwrap_or(&self.source)
    }
}

/// Outcome of checking a frame against its schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCheck {
    /// Key columns that are absent.
    pub missing_keys: Vec<String>,
    /// Non-key columns that are absent and will be materialized as nulls.
    pub missing_optional: Vec<String>,
}

impl SchemaCheck {
    pub fn is_complete(&self) -> bool {
        self.missing_keys.is_empty() && self.missing_optional.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub kind: TableKind,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(kind: TableKind, columns: Vec<ColumnSpec>) -> Self {
        Self { kind, columns }
    }

    pub fn for_kind(kind: TableKind) -> Self {
        match kind {
            TableKind::Listings => Self::listings(),
            TableKind::Calendar => Self::calendar(),
            TableKind::Reviews => Self::reviews(),
        }
    }

    pub fn listings() -> Self {
        use ColumnRole::{
            Categorical, Coordinate, Counter, Date, Flag, Identifier, Measure, NestedList, Price,
            Rate, ReviewActivity, Score, Text,
        };
        let mut specs = vec![
            ColumnSpec::new(columns::ID, Identifier).key(),
            ColumnSpec::new(columns::HOST_ID, Identifier).key(),
            ColumnSpec::new("name", Text),
            ColumnSpec::new("description", Text),
            ColumnSpec::new("neighborhood_overview", Text),
            ColumnSpec::new("host_name", Text).with_default("unknown host"),
            ColumnSpec::new("host_location", Text),
            ColumnSpec::new("host_neighbourhood", Text),
            ColumnSpec::new("host_response_time", Text).with_default("unknown"),
            ColumnSpec::new(columns::LAST_SCRAPED, Date),
            ColumnSpec::new("host_since", Date).with_companion(columns::LAST_SCRAPED),
            ColumnSpec::new("host_response_rate", Rate).renamed("host_response_rate_pct"),
            ColumnSpec::new("host_acceptance_rate", Rate).renamed("host_acceptance_rate_pct"),
            ColumnSpec::new("host_is_superhost", Flag),
            ColumnSpec::new("host_has_profile_pic", Flag),
            ColumnSpec::new("host_identity_verified", Flag),
            ColumnSpec::new("host_total_listings_count", Counter),
            ColumnSpec::new(columns::HOST_VERIFICATIONS, NestedList),
            ColumnSpec::new("neighbourhood", Text),
            ColumnSpec::new("neighbourhood_cleansed", Categorical),
            ColumnSpec::new("property_type", Categorical),
            ColumnSpec::new("room_type", Categorical),
            ColumnSpec::new("accommodates", Counter),
            ColumnSpec::new(columns::BATHROOMS, Measure)
                .with_companion(columns::BATHROOMS_TEXT)
                .with_default("0"),
            ColumnSpec::new(columns::BATHROOMS_TEXT, Text),
            ColumnSpec::new("bedrooms", Counter),
            ColumnSpec::new("beds", Counter),
            ColumnSpec::new(columns::AMENITIES, NestedList),
            ColumnSpec::new("price", Price).renamed(columns::PRICE_NUM),
            ColumnSpec::new("latitude", Coordinate),
            ColumnSpec::new("longitude", Coordinate),
        ];
        for counter in [
            "availability_30",
            "availability_60",
            "availability_90",
            "availability_365",
            "number_of_reviews",
            "number_of_reviews_ltm",
            "number_of_reviews_l30d",
            "number_of_reviews_ly",
        ] {
            specs.push(ColumnSpec::new(counter, Counter));
        }
        specs.push(ColumnSpec::new(columns::FIRST_REVIEW, Date));
        specs.push(ColumnSpec::new(columns::LAST_REVIEW, Date));
        for score in [
            "review_scores_rating",
            "review_scores_cleanliness",
            "review_scores_accuracy",
            "review_scores_communication",
            "review_scores_checkin",
            "review_scores_location",
            "review_scores_value",
        ] {
            specs.push(ColumnSpec::new(score, Score));
        }
        specs.push(ColumnSpec::new("reviews_per_month", ReviewActivity));
        specs.push(ColumnSpec::new("instant_bookable", Flag));
        Self::new(TableKind::Listings, specs)
    }

    pub fn calendar() -> Self {
        Self::new(
            TableKind::Calendar,
            vec![
                ColumnSpec::new(columns::LISTING_ID, ColumnRole::Identifier).key(),
                ColumnSpec::new(columns::DATE, ColumnRole::Date).key(),
                ColumnSpec::new(columns::AVAILABLE, ColumnRole::Availability),
                ColumnSpec::new("price", ColumnRole::Price).renamed(columns::PRICE_NUM),
                ColumnSpec::new("minimum_nights", ColumnRole::Measure),
                ColumnSpec::new("maximum_nights", ColumnRole::Measure),
            ],
        )
    }

    pub fn reviews() -> Self {
        Self::new(
            TableKind::Reviews,
            vec![
                ColumnSpec::new(columns::LISTING_ID, ColumnRole::Identifier).key(),
                ColumnSpec::new(columns::ID, ColumnRole::Identifier).key(),
                ColumnSpec::new(columns::DATE, ColumnRole::Date).key(),
                ColumnSpec::new("reviewer_id", ColumnRole::Identifier),
                ColumnSpec::new("reviewer_name", ColumnRole::Text).with_default("unknown"),
                ColumnSpec::new("comments", ColumnRole::Text).with_default(""),
            ],
        )
    }

    /// Looks a column up by its normalized name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|spec| spec.name() == name)
    }

    pub fn role_of(&self, name: &str) -> Option<ColumnRole> {
        self.column(name).map(|spec| spec.role)
    }

    /// Normalized names of every column with `role`, in declaration order.
    pub fn names_with_role(&self, role: ColumnRole) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|spec| spec.role == role)
            .map(ColumnSpec::name)
            .collect()
    }

    pub fn key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|spec| spec.key)
            .map(ColumnSpec::name)
            .collect()
    }

    /// Compares the declared columns with the columns present in `df`.
    ///
    /// Both source and normalized names count as present.
    pub fn check(&self, df: &DataFrame) -> SchemaCheck {
        let present: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let has = |spec: &ColumnSpec| {
            present
                .iter()
                .any(|name| name == &spec.source || name == spec.name())
        };
        let mut check = SchemaCheck::default();
        for spec in &self.columns {
            if has(spec) {
                continue;
            }
            if spec.key {
                check.missing_keys.push(spec.source.clone());
            } else {
                check.missing_optional.push(spec.source.clone());
            }
        }
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{Column, DataFrame};

    #[test]
    fn renamed_columns_resolve_by_output_name() {
        let schema = TableSchema::listings();
        assert_eq!(schema.role_of("price_num"), Some(ColumnRole::Price));
        assert_eq!(schema.role_of("host_response_rate_pct"), Some(ColumnRole::Rate));
        assert_eq!(schema.role_of("price"), None);
    }

    #[test]
    fn listing_scores_keep_declaration_order() {
        let schema = TableSchema::listings();
        let scores = schema.names_with_role(ColumnRole::Score);
        assert_eq!(scores.len(), 7);
        assert_eq!(scores[0], "review_scores_rating");
        assert_eq!(scores[6], "review_scores_value");
    }

    #[test]
    fn bathrooms_is_not_a_counter() {
        let schema = TableSchema::listings();
        assert!(!schema.names_with_role(ColumnRole::Counter).contains(&"bathrooms"));
    }

    #[test]
    fn check_reports_missing_keys_separately() {
        let df = DataFrame::new(vec![
            Column::new("date".into(), ["2024-01-01"]),
            Column::new("price".into(), ["$10"]),
        ])
        .expect("frame");
        let check = TableSchema::calendar().check(&df);
        assert_eq!(check.missing_keys, vec!["listing_id".to_string()]);
        assert!(check.missing_optional.contains(&"available".to_string()));
        assert!(!check.is_complete());
    }

    #[test]
    fn roles_map_to_normalized_dtypes() {
        assert_eq!(ColumnRole::Counter.normalized_dtype(), DataType::Float64);
        assert_eq!(ColumnRole::Availability.normalized_dtype(), DataType::Boolean);
        assert!(ColumnRole::Score.tracks_missingness());
        assert!(!ColumnRole::Counter.tracks_missingness());
    }
}
