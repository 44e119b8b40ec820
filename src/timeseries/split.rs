//! Temporal train/test splitting

use crate::data::{Dataset, IntervalSet};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info, warn};

/// How overlapping training intervals are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Concatenate in interval-list order; overlapping rows appear twice
    #[default]
    Preserve,
    /// Merge overlapping ranges; every row appears at most once, in time order
    Deduplicate,
}

/// How overlap between training and testing intervals is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakagePolicy {
    /// No check
    #[default]
    Allow,
    /// Log a warning
    Warn,
    /// Reject the split with a configuration error
    Deny,
}

/// Configuration for the temporal splitter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    #[serde(default)]
    pub leakage_policy: LeakagePolicy,
}

impl SplitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the overlap policy
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    /// Builder method to set the leakage policy
    pub fn with_leakage_policy(mut self, policy: LeakagePolicy) -> Self {
        self.leakage_policy = policy;
        self
    }
}

/// Training and testing subsets of one dataset
#[derive(Debug, Clone)]
pub struct SplitResult {
    train: Dataset,
    test: Dataset,
    train_intervals: IntervalSet,
    test_intervals: IntervalSet,
}

impl SplitResult {
    pub fn train(&self) -> &Dataset {
        &self.train
    }

    pub fn test(&self) -> &Dataset {
        &self.test
    }

    pub fn train_intervals(&self) -> &IntervalSet {
        &self.train_intervals
    }

    pub fn test_intervals(&self) -> &IntervalSet {
        &self.test_intervals
    }

    /// Consume into `(train, test)`
    pub fn into_parts(self) -> (Dataset, Dataset) {
        (self.train, self.test)
    }
}

/// Partitions a dataset into training and testing subsets by time interval
#[derive(Debug, Clone, Default)]
pub struct TemporalSplitter {
    config: SplitConfig,
}

impl TemporalSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Split `dataset` into a training subset and a testing subset.
    ///
    /// Training rows are concatenated in interval-list order. Testing rows are
    /// the union of all test-interval matches in timestamp order.
    pub fn split(
        &self,
        dataset: &Dataset,
        train: &IntervalSet,
        test: &IntervalSet,
    ) -> Result<SplitResult> {
        self.check_leakage(train, test)?;

        let index = dataset.index();

        let train_ranges = match self.config.overlap_policy {
            OverlapPolicy::Preserve => {
                let overlaps = train.overlapping_pairs();
                if !overlaps.is_empty() {
                    debug!(?overlaps, "Overlapping training intervals, rows will be duplicated");
                }
                train.row_ranges(index)
            }
            OverlapPolicy::Deduplicate => train.merged_row_ranges(index),
        };
        report_empty("training", train, index.len(), &train.row_ranges(index));

        let test_ranges = test.merged_row_ranges(index);
        report_empty("testing", test, index.len(), &test.row_ranges(index));

        for (interval, range) in train.iter().zip(train.row_ranges(index)) {
            debug!(%interval, start = range.start, end = range.end, "Training interval rows");
        }

        let train_subset = dataset.take_ranges(&train_ranges)?;
        let test_subset = dataset.take_ranges(&test_ranges)?;

        info!(
            rows = dataset.height(),
            train_rows = train_subset.height(),
            test_rows = test_subset.height(),
            "Temporal split complete"
        );

        Ok(SplitResult {
            train: train_subset,
            test: test_subset,
            train_intervals: train.clone(),
            test_intervals: test.clone(),
        })
    }

    fn check_leakage(&self, train: &IntervalSet, test: &IntervalSet) -> Result<()> {
        if self.config.leakage_policy == LeakagePolicy::Allow || !train.intersects(test) {
            return Ok(());
        }

        let msg = "training intervals overlap the testing intervals";
        match self.config.leakage_policy {
            LeakagePolicy::Deny => Err(PipelineError::ConfigurationError(msg.to_string())),
            _ => {
                warn!("{msg}; test scores will include training rows");
                Ok(())
            }
        }
    }
}

fn report_empty(side: &str, set: &IntervalSet, rows: usize, ranges: &[Range<usize>]) {
    for (interval, range) in set.iter().zip(ranges) {
        if range.is_empty() {
            warn!(side, %interval, rows, "Interval matches no rows");
        }
    }
}
