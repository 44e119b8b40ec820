//! End-to-end regression pipeline
//!
//! Each stage produces a plain value consumed by the next:
//! - [`Pipeline::prepare`] splits a [`Dataset`] by time and extracts X/y
//! - [`ModelSet`] validates a model list and fixes the aligned test index
//! - [`ModelSet::train`] fits every model
//! - [`ModelSet::predict`] scores the models into a [`PredictionReport`]

mod config;
mod model_set;
mod report;

pub use config::PipelineConfig;
pub use model_set::ModelSet;
pub use report::{ModelPrediction, PredictionReport, ReconstructionReport};

use crate::data::Dataset;
use crate::error::Result;
use crate::timeseries::{FeatureTargetExtractor, FeatureTargetSplit, SplitResult, TemporalSplitter};
use chrono::NaiveDateTime;
use tracing::info;

/// Split and extracted matrices of one dataset
#[derive(Debug, Clone)]
pub struct PreparedData {
    split: SplitResult,
    data: FeatureTargetSplit,
}

impl PreparedData {
    pub fn split(&self) -> &SplitResult {
        &self.split
    }

    pub fn data(&self) -> &FeatureTargetSplit {
        &self.data
    }

    /// Timestamps of the training rows, duplicates included
    pub fn train_index(&self) -> &[NaiveDateTime] {
        self.split.train().index()
    }

    pub fn test_index(&self) -> &[NaiveDateTime] {
        self.split.test().index()
    }

    pub fn target_columns(&self) -> &[String] {
        &self.data.target_columns
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.data.feature_columns
    }
}

/// Runs the temporal split and the feature/target extraction
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Split `dataset` by the configured intervals and extract X/y
    pub fn prepare(&self, dataset: &Dataset) -> Result<PreparedData> {
        let train = self.config.train_interval_set()?;
        let test = self.config.test_interval_set()?;

        let split = TemporalSplitter::new(self.config.split.clone()).split(dataset, &train, &test)?;
        let data = FeatureTargetExtractor::extract_split(&split, &self.config.target_columns)?;

        info!(
            features = data.n_features(),
            targets = data.n_targets(),
            train_rows = data.x_train.nrows(),
            test_rows = data.x_test.nrows(),
            "Data prepared"
        );

        Ok(PreparedData { split, data })
    }
}
