//! Inclusive timestamp intervals and interval sets

use crate::error::{PipelineError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::ops::Range;

/// Default timestamp format for interval bounds and string time columns
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FALLBACK_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a timestamp with `format`, falling back to ISO variants and plain dates.
pub fn parse_timestamp(value: &str, format: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    let primary = NaiveDateTime::parse_from_str(value, format);
    if let Ok(ts) = primary {
        return Ok(ts);
    }

    for fallback in FALLBACK_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fallback) {
            return Ok(ts);
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight);
    }

    Err(PipelineError::ConfigurationError(format!(
        "cannot parse timestamp '{value}' with format '{format}'"
    )))
}

/// A contiguous span of the dataset, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Interval {
    /// Create an interval; `start` after `end` is a configuration error
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(PipelineError::ConfigurationError(format!(
                "malformed interval: start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds with [`DEFAULT_TIMESTAMP_FORMAT`]
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::parse_with_format(start, end, DEFAULT_TIMESTAMP_FORMAT)
    }

    /// Parse both bounds with an explicit format
    pub fn parse_with_format(start: &str, end: &str, format: &str) -> Result<Self> {
        Self::new(parse_timestamp(start, format)?, parse_timestamp(end, format)?)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        self.start <= *ts && *ts <= self.end
    }

    /// True when the two intervals share at least one instant
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Row range of a sorted index falling inside this interval.
    ///
    /// Bounds outside the index are clipped; no match yields an empty range.
    pub fn row_range(&self, index: &[NaiveDateTime]) -> Range<usize> {
        let lo = index.partition_point(|ts| *ts < self.start);
        let hi = index.partition_point(|ts| *ts <= self.end);
        lo..hi.max(lo)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.start, self.end)
    }
}

/// Ordered sequence of intervals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Create a set from at least one interval
    pub fn new(intervals: Vec<Interval>) -> Result<Self> {
        if intervals.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "interval set must contain at least one interval".to_string(),
            ));
        }
        Ok(Self { intervals })
    }

    /// Parse `(start, end)` string pairs with the given format
    pub fn parse<S: AsRef<str>>(pairs: &[(S, S)], format: &str) -> Result<Self> {
        let intervals = pairs
            .iter()
            .map(|(start, end)| Interval::parse_with_format(start.as_ref(), end.as_ref(), format))
            .collect::<Result<Vec<_>>>()?;
        Self::new(intervals)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Index pairs `(i, j)`, `i < j`, of intervals that overlap each other
    pub fn overlapping_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..self.intervals.len() {
            for j in (i + 1)..self.intervals.len() {
                if self.intervals[i].overlaps(&self.intervals[j]) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// True when any interval of `self` overlaps any interval of `other`
    pub fn intersects(&self, other: &IntervalSet) -> bool {
        self.iter().any(|a| other.iter().any(|b| a.overlaps(b)))
    }

    /// Row ranges in interval-list order (may overlap or repeat)
    pub fn row_ranges(&self, index: &[NaiveDateTime]) -> Vec<Range<usize>> {
        self.intervals.iter().map(|iv| iv.row_range(index)).collect()
    }

    /// Row ranges merged into a sorted, disjoint cover of all matching rows
    pub fn merged_row_ranges(&self, index: &[NaiveDateTime]) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = self
            .row_ranges(index)
            .into_iter()
            .filter(|r| !r.is_empty())
            .collect();
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        merged
    }
}

impl From<Interval> for IntervalSet {
    fn from(interval: Interval) -> Self {
        Self { intervals: vec![interval] }
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
