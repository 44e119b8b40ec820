//! Regressor trait and evaluation metrics

use crate::error::{PipelineError, Result};
use crate::timeseries::aligned_targets;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Metrics for regression evaluation, averaged uniformly over target columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R-squared
    pub r2: f64,
    /// Number of rows scored
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute regression metrics.
    ///
    /// A target column with zero variance contributes an R² of 0.
    pub fn compute_regression(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Result<Self> {
        if y_true.dim() != y_pred.dim() {
            return Err(PipelineError::ShapeError {
                expected: format!("{:?}", y_true.dim()),
                actual: format!("{:?}", y_pred.dim()),
            });
        }

        let n_samples = y_true.nrows();
        let n_targets = y_true.ncols();
        if n_samples == 0 || n_targets == 0 {
            return Ok(Self {
                n_samples,
                ..Self::default()
            });
        }

        let n = n_samples as f64;
        let mut mse = 0.0;
        let mut mae = 0.0;
        let mut r2 = 0.0;

        for (t, p) in y_true.axis_iter(Axis(1)).zip(y_pred.axis_iter(Axis(1))) {
            let errors: Vec<f64> = t.iter().zip(p.iter()).map(|(t, p)| t - p).collect();

            let col_mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
            mse += col_mse;
            mae += errors.iter().map(|e| e.abs()).sum::<f64>() / n;

            let y_mean = t.sum() / n;
            let ss_tot: f64 = t.iter().map(|y| (y - y_mean).powi(2)).sum();
            let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
            if ss_tot > 0.0 {
                r2 += 1.0 - ss_res / ss_tot;
            }
        }

        let k = n_targets as f64;
        let mse = mse / k;
        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae: mae / k,
            r2: r2 / k,
            n_samples,
        })
    }
}

/// Uniform-average R² score
pub fn r2_score(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Result<f64> {
    Ok(ModelMetrics::compute_regression(y_true, y_pred)?.r2)
}

/// A regression model that may look back over an enrolment window.
///
/// `predict` returns one row per input row after the first
/// `enrol_window()` rows.
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;

    /// Number of preceding rows consumed per prediction
    fn enrol_window(&self) -> usize;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    fn is_fitted(&self) -> bool;

    /// R² of the predictions against the targets they line up with
    fn score(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<f64> {
        let pred = self.predict(x)?;
        let actual = aligned_targets(y, self.enrol_window())?;
        r2_score(&actual, &pred)
    }
}

pub(crate) fn check_rows(x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
    if x.nrows() != y.nrows() {
        return Err(PipelineError::ShapeError {
            expected: format!("y rows = {}", x.nrows()),
            actual: format!("y rows = {}", y.nrows()),
        });
    }
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::ShapeError {
            expected: format!("{} feature columns", expected),
            actual: format!("{} feature columns", x.ncols()),
        });
    }
    Ok(())
}
