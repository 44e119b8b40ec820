//! Feature/target extraction

use super::split::SplitResult;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::info;

/// Feature and target matrices for both sides of a split
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTargetSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array2<f64>,
    /// Column names of X, in dataset order
    pub feature_columns: Vec<String>,
    /// Column names of y, in requested order
    pub target_columns: Vec<String>,
}

impl FeatureTargetSplit {
    pub fn n_features(&self) -> usize {
        self.feature_columns.len()
    }

    pub fn n_targets(&self) -> usize {
        self.target_columns.len()
    }

    /// Consume into `(x_train, y_train, x_test, y_test)`
    pub fn into_arrays(self) -> (Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
        (self.x_train, self.y_train, self.x_test, self.y_test)
    }
}

/// Separates datasets into feature and target matrices
pub struct FeatureTargetExtractor;

impl FeatureTargetExtractor {
    /// Extract X/y for both sides of a split
    pub fn extract_split<S: AsRef<str>>(
        split: &SplitResult,
        targets: &[S],
    ) -> Result<FeatureTargetSplit> {
        Self::extract(split.train(), split.test(), targets)
    }

    /// Extract X/y from a training and a testing subset.
    ///
    /// y holds `targets` in the given order; X holds every other column in
    /// its original order.
    pub fn extract<S: AsRef<str>>(
        train: &Dataset,
        test: &Dataset,
        targets: &[S],
    ) -> Result<FeatureTargetSplit> {
        let target_columns = validate_targets(targets, train, test)?;
        let feature_columns = feature_columns(&train.column_names(), &target_columns);

        let x_train = columns_to_array2(train.frame(), &feature_columns)?;
        let y_train = columns_to_array2(train.frame(), &target_columns)?;
        let x_test = columns_to_array2(test.frame(), &feature_columns)?;
        let y_test = columns_to_array2(test.frame(), &target_columns)?;

        info!(
            x_train = ?x_train.dim(),
            y_train = ?y_train.dim(),
            x_test = ?x_test.dim(),
            y_test = ?y_test.dim(),
            "Feature/target extraction complete"
        );

        Ok(FeatureTargetSplit {
            x_train,
            y_train,
            x_test,
            y_test,
            feature_columns,
            target_columns,
        })
    }
}

fn validate_targets<S: AsRef<str>>(
    targets: &[S],
    train: &Dataset,
    test: &Dataset,
) -> Result<Vec<String>> {
    if targets.is_empty() {
        return Err(PipelineError::ConfigurationError(
            "target column list is empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(targets.len());
    for target in targets {
        let name = target.as_ref();
        if !train.has_column(name) || !test.has_column(name) {
            return Err(PipelineError::unknown_target(name));
        }
        if !seen.insert(name) {
            return Err(PipelineError::ConfigurationError(format!(
                "target column listed twice: {name}"
            )));
        }
        names.push(name.to_string());
    }
    Ok(names)
}

/// Every column not named in `targets`, order preserved
pub fn feature_columns(columns: &[String], targets: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| !targets.contains(c))
        .cloned()
        .collect()
}

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`.
///
/// Values are cast to `Float64`; nulls become `NaN`.
fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let column = df
                .column(col_name)
                .map_err(|_| PipelineError::DataError(format!("missing column: {col_name}")))?;
            let series_f64 = column.as_materialized_series().cast(&DataType::Float64)?;
            let values: Vec<f64> = series_f64
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}
