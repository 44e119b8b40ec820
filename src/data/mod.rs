//! Time-indexed data and interval definitions

mod dataset;
mod interval;

pub use dataset::{ColumnMeta, Dataset};
pub use interval::{parse_timestamp, Interval, IntervalSet, DEFAULT_TIMESTAMP_FORMAT};
