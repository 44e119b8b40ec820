//! Time-indexed dataset with column metadata

use super::interval::{parse_timestamp, DEFAULT_TIMESTAMP_FORMAT};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Description and unit of a named column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub description: String,
    pub unit: String,
}

impl ColumnMeta {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: unit.into(),
        }
    }
}

/// Rows of named columns tagged by a timestamp index.
///
/// Datasets built through [`Dataset::new`] or [`Dataset::from_frame`] have a
/// non-decreasing index. Training subsets produced by the splitter may be a
/// concatenation of several time-ordered blocks.
#[derive(Debug, Clone)]
pub struct Dataset {
    index: Vec<NaiveDateTime>,
    frame: DataFrame,
    metadata: Vec<ColumnMeta>,
}

impl Dataset {
    /// Create a dataset from an index, a frame and its metadata sidecar
    pub fn new(
        index: Vec<NaiveDateTime>,
        frame: DataFrame,
        metadata: Vec<ColumnMeta>,
    ) -> Result<Self> {
        if frame.width() == 0 {
            return Err(PipelineError::DataError("dataset has no columns".to_string()));
        }
        if index.is_empty() {
            return Err(PipelineError::DataError("dataset has no rows".to_string()));
        }
        if index.len() != frame.height() {
            return Err(PipelineError::DataError(format!(
                "index has {} entries but frame has {} rows",
                index.len(),
                frame.height()
            )));
        }
        if let Some(pos) = index.windows(2).position(|w| w[0] > w[1]) {
            return Err(PipelineError::DataError(format!(
                "index is not time ordered at row {}: {} follows {}",
                pos + 1,
                index[pos + 1],
                index[pos]
            )));
        }

        Ok(Self { index, frame, metadata })
    }

    /// Build a dataset from a frame holding a time column.
    ///
    /// Keeps the columns listed in `columns` (in that order) except the time
    /// column and any name in `irrelevant`. String time columns are parsed
    /// with `timestamp_format`; integer time columns are read as Unix seconds.
    pub fn from_frame(
        frame: &DataFrame,
        time_column: &str,
        columns: &[ColumnMeta],
        irrelevant: &[&str],
        timestamp_format: Option<&str>,
    ) -> Result<Self> {
        let time = frame
            .column(time_column)
            .map_err(|_| PipelineError::DataError(format!("missing time column: {time_column}")))?;
        let index = parse_index(
            time.as_materialized_series(),
            timestamp_format.unwrap_or(DEFAULT_TIMESTAMP_FORMAT),
        )?;

        let relevant: Vec<ColumnMeta> = columns
            .iter()
            .filter(|c| c.name != time_column && !irrelevant.contains(&c.name.as_str()))
            .cloned()
            .collect();

        let data = frame.select(relevant.iter().map(|c| c.name.as_str()))?;

        Self::new(index, data, relevant)
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn metadata(&self) -> &[ColumnMeta] {
        &self.metadata
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Column names in frame order
    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn description(&self, column: &str) -> Option<&str> {
        self.meta(column).map(|m| m.description.as_str())
    }

    pub fn unit(&self, column: &str) -> Option<&str> {
        self.meta(column).map(|m| m.unit.as_str())
    }

    fn meta(&self, column: &str) -> Option<&ColumnMeta> {
        self.metadata.iter().find(|m| m.name == column)
    }

    /// Copy the rows covered by `ranges`, concatenated in the given order.
    ///
    /// The result owns its rows in one contiguous chunk per column; the parent
    /// dataset is never touched.
    pub(crate) fn take_ranges(&self, ranges: &[Range<usize>]) -> Result<Dataset> {
        let total: usize = ranges.iter().map(|r| r.len()).sum();
        let mut index = Vec::with_capacity(total);
        let mut frame = self.frame.slice(0, 0);

        for range in ranges.iter().filter(|r| !r.is_empty()) {
            let block = self.frame.slice(range.start as i64, range.len());
            frame.vstack_mut(&block)?;
            index.extend_from_slice(&self.index[range.clone()]);
        }
        frame.as_single_chunk_par();

        Ok(Dataset {
            index,
            frame,
            metadata: self.metadata.clone(),
        })
    }
}

fn parse_index(series: &Series, format: &str) -> Result<Vec<NaiveDateTime>> {
    let dtype = series.dtype().clone();

    if dtype.is_integer() {
        let secs = series.cast(&DataType::Int64)?;
        return secs
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let value = value.ok_or_else(|| null_timestamp(row))?;
                DateTime::from_timestamp(value, 0)
                    .map(|dt| dt.naive_utc())
                    .ok_or_else(|| {
                        PipelineError::DataError(format!(
                            "timestamp out of range at row {row}: {value}"
                        ))
                    })
            })
            .collect();
    }

    let text = if dtype == DataType::String {
        series.clone()
    } else {
        series.cast(&DataType::String)?
    };

    text.str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let value = value.ok_or_else(|| null_timestamp(row))?;
            parse_timestamp(value, format)
                .map_err(|e| PipelineError::DataError(format!("row {row}: {e}")))
        })
        .collect()
}

fn null_timestamp(row: usize) -> PipelineError {
    PipelineError::DataError(format!("null timestamp at row {row}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn meta() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new("v", "flow", "m3/h"),
            ColumnMeta::new("w", "temperature", "C"),
        ]
    }

    #[test]
    fn test_new_validates_length() {
        let frame = df!("v" => &[1.0, 2.0, 3.0]).unwrap();
        let result = Dataset::new(vec![ts(0), ts(1)], frame, meta());
        assert!(matches!(result, Err(PipelineError::DataError(_))));
    }

    #[test]
    fn test_new_validates_order() {
        let frame = df!("v" => &[1.0, 2.0, 3.0]).unwrap();
        let result = Dataset::new(vec![ts(0), ts(2), ts(1)], frame, meta());
        assert!(matches!(result, Err(PipelineError::DataError(_))));
    }

    #[test]
    fn test_new_allows_duplicate_timestamps() {
        let frame = df!("v" => &[1.0, 2.0, 3.0]).unwrap();
        let ds = Dataset::new(vec![ts(0), ts(1), ts(1)], frame, meta()).unwrap();
        assert_eq!(ds.height(), 3);
    }

    #[test]
    fn test_from_frame_string_time_column() {
        let frame = df!(
            "time" => &["2020-01-01 00:00:00", "2020-01-01 01:00:00", "2020-01-01 02:00:00"],
            "v" => &[1.0, 2.0, 3.0],
            "w" => &[4.0, 5.0, 6.0],
            "junk" => &[0.0, 0.0, 0.0]
        )
        .unwrap();

        let ds = Dataset::from_frame(&frame, "time", &meta(), &[], None).unwrap();
        assert_eq!(ds.index(), &[ts(0), ts(1), ts(2)]);
        assert_eq!(ds.column_names(), vec!["v", "w"]);
        assert_eq!(ds.description("w"), Some("temperature"));
        assert_eq!(ds.unit("v"), Some("m3/h"));
    }

    #[test]
    fn test_from_frame_drops_irrelevant() {
        let frame = df!(
            "time" => &[1_577_836_800i64, 1_577_840_400, 1_577_844_000],
            "v" => &[1.0, 2.0, 3.0],
            "w" => &[4.0, 5.0, 6.0]
        )
        .unwrap();

        let ds = Dataset::from_frame(&frame, "time", &meta(), &["w"], None).unwrap();
        assert_eq!(ds.column_names(), vec!["v"]);
        assert_eq!(ds.index(), &[ts(0), ts(1), ts(2)]);
        assert!(ds.unit("w").is_none());
    }

    #[test]
    fn test_from_frame_missing_time_column() {
        let frame = df!("v" => &[1.0]).unwrap();
        let result = Dataset::from_frame(&frame, "time", &meta(), &[], None);
        assert!(matches!(result, Err(PipelineError::DataError(_))));
    }

    #[test]
    fn test_take_ranges_copies_in_order() {
        let frame = df!("v" => &[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        let ds = Dataset::new((0..5).map(ts).collect(), frame, meta()).unwrap();

        let sub = ds.take_ranges(&[3..5, 0..2, 1..1]).unwrap();
        assert_eq!(sub.index(), &[ts(3), ts(4), ts(0), ts(1)]);
        let values: Vec<f64> = sub
            .frame()
            .column("v")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(values, vec![3.0, 4.0, 0.0, 1.0]);
        assert_eq!(ds.height(), 5);
    }

    #[test]
    fn test_take_ranges_leaves_single_chunk() {
        let frame = df!("v" => &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let ds = Dataset::new((0..6).map(ts).collect(), frame, meta()).unwrap();

        let sub = ds.take_ranges(&[0..2, 2..4, 4..6]).unwrap();
        assert_eq!(sub.height(), 6);
        assert!(sub.frame().get_columns().iter().all(|c| c.n_chunks() == 1));
    }
}
