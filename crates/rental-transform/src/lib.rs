//! Rental snapshot transformation.
//!
//! This crate turns the three raw snapshot tables into the flat sheet:
//!
//! - **normalize**: scalar parsing, renames and review-date anchors
//! - **impute**: cascading null imputation and the type-driven safety net
//! - **derive**: calendar date parts and price buckets
//! - **expand**: allow-listed indicator columns for nested attributes
//! - **build**: listing price basis, join, review activity and column order
//! - **pipeline**: the stage chain that runs all of the above

pub mod bucket;
pub mod build;
pub mod derive;
pub mod expand;
pub mod impute;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod resolver;
pub mod snapshot;

pub use build::{BuildStatus, FlatSheet, FlatSheetBuilder};
pub use derive::FeatureDeriver;
pub use expand::NestedFieldExpander;
pub use impute::NullImputer;
pub use normalize::TypeNormalizer;
pub use pipeline::{PipelineState, TransformOutput, TransformPipeline, TransformStage};
pub use resolver::{FallbackResolver, Resolution};
pub use snapshot::Snapshot;
