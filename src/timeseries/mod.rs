//! Time series module
//!
//! Turns a time-indexed dataset into model-ready matrices:
//! - Temporal train/test splitting by interval sets
//! - Feature/target extraction
//! - Enrolment-window alignment
//! - Time-ordered cross-validation folds

mod extract;
mod split;
mod validation;
mod window;

pub use extract::{feature_columns, FeatureTargetExtractor, FeatureTargetSplit};
pub use split::{LeakagePolicy, OverlapPolicy, SplitConfig, SplitResult, TemporalSplitter};
pub use validation::{TimeSeriesCV, TimeSeriesFold};
pub use window::{align_tail, aligned_targets, index_column, lagged_windows, max_enrol_window};
