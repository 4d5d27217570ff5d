//! Stage pipeline with ordered execution.
//!
//! Each stage implements [`TransformStage`], consumes the previous stage's
//! snapshot and returns a complete new one. The flat-sheet builder runs after
//! the last stage.
//!
//! # Standard Pipeline Order
//!
//! 1. **TypeNormalizer** - parse scalars, rename, complete review anchors
//! 2. **NullImputer** - cascading imputation and safety net
//! 3. **FeatureDeriver** - calendar date parts and price buckets
//! 4. **NestedFieldExpander** - allow-listed indicator columns
//!
//! # Example
//!
//! ```ignore
//! use rental_transform::{Snapshot, TransformPipeline};
//!
//! let pipeline = TransformPipeline::standard(Arc::new(PipelineConfig::default()));
//! let output = pipeline.run(&snapshot)?;
//! ```

use std::sync::Arc;

use rental_model::{ImputationAudit, PipelineConfig, Result};
use tracing::{info, info_span};

use crate::build::{FlatSheet, FlatSheetBuilder};
use crate::derive::FeatureDeriver;
use crate::expand::NestedFieldExpander;
use crate::impute::NullImputer;
use crate::normalize::TypeNormalizer;
use crate::snapshot::Snapshot;

/// A single stage in the transform pipeline.
pub trait TransformStage {
    /// Run this stage on an owned snapshot.
    fn run(&self, snapshot: Snapshot, state: &mut PipelineState) -> Result<Snapshot>;

    /// Human-readable name for this stage (for logging/debugging).
    fn stage_name(&self) -> &str;
}

/// Mutable state shared across stages.
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Resolved counts reported by every stage.
    pub audit: ImputationAudit,
    /// Stage execution log.
    pub executed_stages: Vec<String>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of a complete run.
#[derive(Debug)]
pub struct TransformOutput {
    pub flat_sheet: FlatSheet,
    /// Tables as they stood after the last stage.
    pub snapshot: Snapshot,
    pub audit: ImputationAudit,
    pub executed_stages: Vec<String>,
}

pub struct TransformPipeline {
    stages: Vec<Box<dyn TransformStage>>,
    builder: FlatSheetBuilder,
}

impl TransformPipeline {
    /// Pipeline with no stages, only the flat-sheet builder.
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            stages: Vec::new(),
            builder: FlatSheetBuilder::new(config),
        }
    }

    /// Normalize, impute, derive, expand, then build.
    pub fn standard(config: Arc<PipelineConfig>) -> Self {
        Self::new(Arc::clone(&config))
            .add_stage(Box::new(TypeNormalizer::new(Arc::clone(&config))))
            .add_stage(Box::new(NullImputer::new(Arc::clone(&config))))
            .add_stage(Box::new(FeatureDeriver::new(Arc::clone(&config))))
            .add_stage(Box::new(NestedFieldExpander::new(config)))
    }

    /// Add a stage to the end of the pipeline.
    pub fn add_stage(mut self, stage: Box<dyn TransformStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// List stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.stage_name()).collect()
    }

    /// Runs every stage on a copy of `input`, then builds the flat sheet.
    pub fn run(&self, input: &Snapshot) -> Result<TransformOutput> {
        let mut state = PipelineState::new();
        let [listings, calendar, reviews] = input.shapes();
        info!(?listings, ?calendar, ?reviews, "received snapshot");

        let mut snapshot = input.clone();
        for stage in &self.stages {
            let name = stage.stage_name().to_string();
            let span = info_span!("stage", name = %name);
            let _guard = span.enter();
            snapshot = stage.run(snapshot, &mut state)?;
            let [listings, calendar, reviews] = snapshot.shapes();
            info!(?listings, ?calendar, ?reviews, "stage finished");
            state.executed_stages.push(name);
        }

        let flat_sheet = {
            let span = info_span!("stage", name = "build");
            let _guard = span.enter();
            self.builder.build(&snapshot, &mut state.audit)?
        };
        state.executed_stages.push("build".to_string());
        info!(
            rows = flat_sheet.frame.height(),
            columns = flat_sheet.frame.width(),
            status = ?flat_sheet.status,
            "flat sheet ready"
        );

        Ok(TransformOutput {
            flat_sheet,
            snapshot,
            audit: state.audit,
            executed_stages: state.executed_stages,
        })
    }
}
