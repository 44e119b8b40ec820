//! Time-series regression
//!
//! Splits a time-indexed dataset into training and testing subsets by
//! timestamp interval, extracts feature and target matrices, and trains and
//! compares a catalog of regression models on them.
//!
//! # Modules
//!
//! - [`data`] - Time-indexed datasets, intervals and interval sets
//! - [`timeseries`] - Temporal splitting, X/y extraction, window alignment, time-ordered CV
//! - [`training`] - Linear, MLP, LSTM, ensemble and autoencoder models
//! - [`pipeline`] - Configuration, model sets and prediction reports

// Core error handling
pub mod error;

pub mod data;
pub mod timeseries;
pub mod training;
pub mod pipeline;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result};

    // Data
    pub use crate::data::{ColumnMeta, Dataset, Interval, IntervalSet, DEFAULT_TIMESTAMP_FORMAT};

    // Time series
    pub use crate::timeseries::{
        FeatureTargetExtractor, FeatureTargetSplit, LeakagePolicy, OverlapPolicy, SplitConfig,
        SplitResult, TemporalSplitter, TimeSeriesCV,
    };
    pub use crate::timeseries::{
        align_tail, aligned_targets, index_column, lagged_windows, max_enrol_window,
    };

    // Training
    pub use crate::training::{Model, ModelMetrics, ModelOptions, OptimizerConfig, Regressor};

    // Pipeline
    pub use crate::pipeline::{ModelSet, Pipeline, PipelineConfig, PredictionReport, PreparedData};
}
