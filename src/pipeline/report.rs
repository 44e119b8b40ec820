//! Prediction and reconstruction reports

use crate::error::{PipelineError, Result};
use crate::training::ModelMetrics;
use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Scores and aligned test predictions of one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub name: String,
    pub kind: String,
    pub enrol_window: usize,
    pub metrics_train: ModelMetrics,
    pub metrics_test: ModelMetrics,
    /// Test predictions, one row per entry of the report's index column
    pub predictions: Array2<f64>,
    /// `predictions - actual`, same shape as `predictions`
    pub deviations: Array2<f64>,
}

impl ModelPrediction {
    pub fn r2_train(&self) -> f64 {
        self.metrics_train.r2
    }

    pub fn r2_test(&self) -> f64 {
        self.metrics_test.r2
    }
}

/// Output of [`ModelSet::predict`](super::ModelSet::predict)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    pub index_column: Vec<NaiveDateTime>,
    pub target_columns: Vec<String>,
    pub models: Vec<ModelPrediction>,
}

impl PredictionReport {
    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn train_scores(&self) -> Vec<f64> {
        self.models.iter().map(|m| m.r2_train()).collect()
    }

    pub fn test_scores(&self) -> Vec<f64> {
        self.models.iter().map(|m| m.r2_test()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ModelPrediction> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Model with the highest test R²
    pub fn best(&self) -> Option<&ModelPrediction> {
        self.models
            .iter()
            .max_by(|a, b| a.r2_test().total_cmp(&b.r2_test()))
    }

    /// Predictions of `name` as a frame: `time` plus one column per target
    pub fn predictions_frame(&self, name: &str) -> Result<DataFrame> {
        let model = self.model(name)?;
        timed_frame(&self.index_column, &self.target_columns, &model.predictions)
    }

    /// Deviations of `name` as a frame: `time` plus one column per target
    pub fn deviations_frame(&self, name: &str) -> Result<DataFrame> {
        let model = self.model(name)?;
        timed_frame(&self.index_column, &self.target_columns, &model.deviations)
    }

    /// Score table, one line per model
    pub fn summary(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "{:<24} {:>10} {:>10} {:>10} {:>10}\n",
            "Model", "R² train", "R² test", "RMSE test", "MAE test"
        ));
        for m in &self.models {
            report.push_str(&format!(
                "{:<24} {:>10.4} {:>10.4} {:>10.4} {:>10.4}\n",
                m.name,
                m.r2_train(),
                m.r2_test(),
                m.metrics_test.rmse,
                m.metrics_test.mae
            ));
        }
        report
    }

    fn model(&self, name: &str) -> Result<&ModelPrediction> {
        self.get(name).ok_or_else(|| {
            PipelineError::ConfigurationError(format!("no model named {name} in report"))
        })
    }
}

/// Output of [`ModelSet::reconstruct`](super::ModelSet::reconstruct)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub name: String,
    pub index_column: Vec<NaiveDateTime>,
    pub feature_columns: Vec<String>,
    /// Reconstruction of the test features
    pub reconstruction: Array2<f64>,
    /// Mean squared reconstruction error per test row
    pub errors: Array1<f64>,
}

impl ReconstructionReport {
    pub fn mean_error(&self) -> f64 {
        self.errors.mean().unwrap_or(0.0)
    }

    /// Rows whose error exceeds `threshold`
    pub fn anomalies(&self, threshold: f64) -> Vec<NaiveDateTime> {
        self.index_column
            .iter()
            .zip(self.errors.iter())
            .filter(|(_, e)| **e > threshold)
            .map(|(ts, _)| *ts)
            .collect()
    }

    pub fn reconstruction_frame(&self) -> Result<DataFrame> {
        timed_frame(&self.index_column, &self.feature_columns, &self.reconstruction)
    }
}

fn timed_frame(
    index: &[NaiveDateTime],
    names: &[String],
    values: &Array2<f64>,
) -> Result<DataFrame> {
    if values.nrows() != index.len() || values.ncols() != names.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("({}, {})", index.len(), names.len()),
            actual: format!("{:?}", values.dim()),
        });
    }

    let mut columns: Vec<Column> = Vec::with_capacity(names.len() + 1);
    columns.push(Series::new("time".into(), index).into());
    for (name, column) in names.iter().zip(values.axis_iter(Axis(1))) {
        columns.push(Series::new(name.as_str().into(), column.to_vec()).into());
    }
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    fn prediction(name: &str, r2_test: f64) -> ModelPrediction {
        ModelPrediction {
            name: name.to_string(),
            kind: "linear".to_string(),
            enrol_window: 0,
            metrics_train: ModelMetrics { r2: 0.9, ..ModelMetrics::default() },
            metrics_test: ModelMetrics { r2: r2_test, ..ModelMetrics::default() },
            predictions: array![[1.0], [2.0]],
            deviations: array![[0.5], [-0.5]],
        }
    }

    fn report() -> PredictionReport {
        PredictionReport {
            index_column: vec![ts(8), ts(9)],
            target_columns: vec!["w".to_string()],
            models: vec![prediction("a", 0.4), prediction("b", 0.8)],
        }
    }

    #[test]
    fn test_scores_and_best() {
        let report = report();
        assert_eq!(report.names(), vec!["a", "b"]);
        assert_eq!(report.test_scores(), vec![0.4, 0.8]);
        assert_eq!(report.train_scores(), vec![0.9, 0.9]);
        assert_eq!(report.best().unwrap().name, "b");
    }

    #[test]
    fn test_summary_lists_every_model() {
        let summary = report().summary();
        assert_eq!(summary.lines().count(), 3);
        assert!(summary.contains("0.8000"));
    }

    #[test]
    fn test_frames() {
        let report = report();
        let frame = report.deviations_frame("a").unwrap();
        assert_eq!(frame.shape(), (2, 2));
        assert!(frame.column("time").is_ok());
        assert_eq!(frame.column("w").unwrap().f64().unwrap().get(1), Some(-0.5));
        assert!(matches!(
            report.predictions_frame("zzz"),
            Err(PipelineError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_reconstruction_anomalies() {
        let report = ReconstructionReport {
            name: "ae".to_string(),
            index_column: vec![ts(0), ts(1), ts(2)],
            feature_columns: vec!["v".to_string()],
            reconstruction: array![[0.0], [1.0], [2.0]],
            errors: array![0.1, 2.0, 0.3],
        };
        assert_eq!(report.anomalies(1.0), vec![ts(1)]);
        assert!((report.mean_error() - 0.8).abs() < 1e-12);
        assert_eq!(report.reconstruction_frame().unwrap().height(), 3);
    }
}
