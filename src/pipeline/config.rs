//! Pipeline configuration

use crate::data::{IntervalSet, DEFAULT_TIMESTAMP_FORMAT};
use crate::error::{PipelineError, Result};
use crate::timeseries::{LeakagePolicy, OverlapPolicy, SplitConfig};
use serde::{Deserialize, Serialize};

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

/// Where to train, where to test and what to predict.
///
/// Intervals are `(start, end)` timestamp strings, both bounds inclusive,
/// parsed with `timestamp_format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub train_intervals: Vec<(String, String)>,
    pub test_intervals: Vec<(String, String)>,
    pub target_columns: Vec<String>,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default)]
    pub split: SplitConfig,
}

impl PipelineConfig {
    pub fn new<S: Into<String>>(
        train_intervals: Vec<(S, S)>,
        test_intervals: Vec<(S, S)>,
        target_columns: Vec<S>,
    ) -> Self {
        let pairs = |v: Vec<(S, S)>| -> Vec<(String, String)> {
            v.into_iter().map(|(a, b)| (a.into(), b.into())).collect()
        };
        Self {
            train_intervals: pairs(train_intervals),
            test_intervals: pairs(test_intervals),
            target_columns: target_columns.into_iter().map(Into::into).collect(),
            timestamp_format: default_timestamp_format(),
            split: SplitConfig::default(),
        }
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::SerializationError(e.to_string()))
    }

    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.split.overlap_policy = policy;
        self
    }

    pub fn with_leakage_policy(mut self, policy: LeakagePolicy) -> Self {
        self.split.leakage_policy = policy;
        self
    }

    pub fn train_interval_set(&self) -> Result<IntervalSet> {
        IntervalSet::parse(&self.train_intervals, &self.timestamp_format)
    }

    pub fn test_interval_set(&self) -> Result<IntervalSet> {
        IntervalSet::parse(&self.test_intervals, &self.timestamp_format)
    }
}
