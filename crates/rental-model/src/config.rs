//! Pipeline configuration.
//!
//! Allow-lists, group keys and sentinels are fixed configuration handed to
//! the transform at construction. Defaults reproduce the production setup;
//! a TOML file can override any subset of the keys.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RentalError, Result};

const DEFAULT_AMENITIES: [&str; 18] = [
    "Wifi",
    "Dedicated workspace",
    "Self check-in",
    "Free parking on premises",
    "Kitchen",
    "Refrigerator",
    "Microwave",
    "Stove",
    "Coffee maker",
    "Cooking basics",
    "Dishes and silverware",
    "Room-darkening shades",
    "Essentials",
    "Washer",
    "Smoke alarm",
    "Carbon monoxide alarm",
    "Fire extinguisher",
    "First aid kit",
];

const DEFAULT_VERIFICATIONS: [&str; 3] = ["phone", "email", "work_email"];

const DEFAULT_GROUP_KEYS: [&str; 3] = ["neighbourhood_cleansed", "room_type", "accommodates"];

const DEFAULT_BUCKET_LABELS: [&str; 5] = ["Very Low", "Low", "Medium", "High", "Very High"];

const DEFAULT_NA_TOKENS: [&str; 6] = ["N/A", "n/a", "NA", "na", "None", ""];

/// How price quantities are mapped to bucket labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BucketingMode {
    /// Run-local quintiles, reduced when edges collide.
    #[default]
    Quantile,
    /// Fixed, right-closed bins; the lowest edge is inclusive.
    Fixed { bins: Vec<f64>, labels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Amenity names expanded into `amenities_*` indicators.
    pub amenities: Vec<String>,
    /// Verification methods expanded into `host_verifications_*` indicators.
    pub verifications: Vec<String>,
    /// Composite key for the intermediate imputation scope.
    pub group_keys: Vec<String>,
    pub neighbourhood_key: String,
    pub host_key: String,
    /// Ordered labels for quantile bucketing.
    pub bucket_labels: Vec<String>,
    /// Label used when a bucket cannot be computed.
    pub bucket_fallback: String,
    pub date_sentinel: String,
    pub timestamp_sentinel: String,
    pub unknown_label: String,
    /// Listing text values treated as missing.
    pub na_tokens: Vec<String>,
    /// Calendar columns dropped during normalization.
    pub calendar_drop: Vec<String>,
    pub rate_bounds: (f64, f64),
    /// Quantiles used to winsorize score columns.
    pub score_winsor: (f64, f64),
    pub bucketing: BucketingMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            amenities: to_strings(&DEFAULT_AMENITIES),
            verifications: to_strings(&DEFAULT_VERIFICATIONS),
            group_keys: to_strings(&DEFAULT_GROUP_KEYS),
            neighbourhood_key: "neighbourhood_cleansed".to_string(),
            host_key: "host_id".to_string(),
            bucket_labels: to_strings(&DEFAULT_BUCKET_LABELS),
            bucket_fallback: "Medium".to_string(),
            date_sentinel: "1970-01-01".to_string(),
            timestamp_sentinel: "1970-01-01T00:00:00Z".to_string(),
            unknown_label: "unknown".to_string(),
            na_tokens: to_strings(&DEFAULT_NA_TOKENS),
            calendar_drop: vec!["adjusted_price".to_string(), "_id".to_string()],
            rate_bounds: (0.0, 100.0),
            score_winsor: (0.01, 0.99),
            bucketing: BucketingMode::Quantile,
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration file; keys absent from the file keep their defaults.
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|source| RentalError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|error| RentalError::message(format!("failed to render configuration: {error}")))
    }

    pub fn with_bucketing(mut self, bucketing: BucketingMode) -> Self {
        self.bucketing = bucketing;
        self
    }

    pub fn with_amenities(mut self, amenities: Vec<String>) -> Self {
        self.amenities = amenities;
        self
    }

    pub fn is_na_token(&self, value: &str) -> bool {
        self.na_tokens.iter().any(|token| token == value.trim())
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_carry_production_allow_lists() {
        let config = PipelineConfig::default();
        assert_eq!(config.amenities.len(), 18);
        assert_eq!(config.verifications, vec!["phone", "email", "work_email"]);
        assert_eq!(config.bucket_fallback, "Medium");
        assert_eq!(config.bucketing, BucketingMode::Quantile);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "unknown_label = \"n/d\"").expect("write");
        writeln!(file, "[bucketing]").expect("write");
        writeln!(file, "mode = \"fixed\"").expect("write");
        writeln!(file, "bins = [0.0, 100.0, 1000.0]").expect("write");
        writeln!(file, "labels = [\"cheap\", \"pricey\"]").expect("write");

        let config = PipelineConfig::from_toml_path(file.path()).expect("load");
        assert_eq!(config.unknown_label, "n/d");
        assert_eq!(config.group_keys.len(), 3);
        assert_eq!(
            config.bucketing,
            BucketingMode::Fixed {
                bins: vec![0.0, 100.0, 1000.0],
                labels: vec!["cheap".to_string(), "pricey".to_string()],
            }
        );
    }

    #[test]
    fn invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "amenities = 3").expect("write");
        let error = PipelineConfig::from_toml_path(file.path()).expect_err("invalid");
        assert!(matches!(error, RentalError::Config { .. }));
    }

    #[test]
    fn na_tokens_match_trimmed_values() {
        let config = PipelineConfig::default();
        assert!(config.is_na_token(" N/A "));
        assert!(config.is_na_token(""));
        assert!(!config.is_na_token("Kitchen"));
    }
}
