//! A validated list of models trained and scored together

use super::report::{ModelPrediction, PredictionReport, ReconstructionReport};
use super::PreparedData;
use crate::error::{PipelineError, Result};
use crate::timeseries::{align_tail, aligned_targets, index_column, max_enrol_window};
use crate::training::{Model, ModelMetrics, Regressor};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::Instant;
use tracing::info;

/// Models compared on one prepared dataset.
///
/// All test predictions are aligned to the largest enrolment window, so every
/// model is scored on the same rows: `test_index[max_enrol_window..]`.
/// The set is bound to the prepared data it was built from; training or
/// scoring on any other split is rejected.
#[derive(Debug, Clone)]
pub struct ModelSet {
    models: Vec<Model>,
    max_enrol_window: usize,
    test_index: Vec<NaiveDateTime>,
    index_column: Vec<NaiveDateTime>,
    feature_columns: Vec<String>,
    target_columns: Vec<String>,
}

impl ModelSet {
    /// Validate the model list against the prepared data.
    ///
    /// The list must be non-empty with unique names, and an autoencoder
    /// cannot share the set with any other model.
    pub fn new(models: Vec<Model>, data: &PreparedData) -> Result<Self> {
        if models.is_empty() {
            return Err(PipelineError::ConfigurationError("model list is empty".to_string()));
        }

        let autoencoders = models.iter().filter(|m| m.is_autoencoder()).count();
        if autoencoders > 0 && models.len() > 1 {
            return Err(PipelineError::ConfigurationError(
                "an autoencoder cannot be trained alongside other models".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for model in &models {
            if !names.insert(model.name()) {
                return Err(PipelineError::ConfigurationError(format!(
                    "model name used twice: {}",
                    model.name()
                )));
            }
        }

        let max_enrol_window = max_enrol_window(models.iter().map(|m| m.enrol_window()));
        let index_column = index_column(data.test_index(), max_enrol_window)?;

        info!(
            models = models.len(),
            max_enrol_window,
            aligned_rows = index_column.len(),
            "Model set initialized"
        );

        Ok(Self {
            models,
            max_enrol_window,
            test_index: data.test_index().to_vec(),
            index_column,
            feature_columns: data.feature_columns().to_vec(),
            target_columns: data.target_columns().to_vec(),
        })
    }

    /// Reject prepared data other than the split the set was built from
    fn check_data(&self, data: &PreparedData) -> Result<()> {
        if data.feature_columns() != self.feature_columns.as_slice()
            || data.target_columns() != self.target_columns.as_slice()
        {
            return Err(PipelineError::ConfigurationError(format!(
                "model set was built for features {:?} and targets {:?}, got {:?} and {:?}",
                self.feature_columns,
                self.target_columns,
                data.feature_columns(),
                data.target_columns()
            )));
        }

        let test_index = data.test_index();
        if test_index.len() <= self.max_enrol_window {
            return Err(PipelineError::AlignmentError {
                window: self.max_enrol_window,
                rows: test_index.len(),
            });
        }
        if test_index != self.test_index.as_slice() {
            return Err(PipelineError::ShapeError {
                expected: format!(
                    "the {} test timestamps the model set was built on",
                    self.test_index.len()
                ),
                actual: format!("{} different test timestamps", test_index.len()),
            });
        }
        Ok(())
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn max_enrol_window(&self) -> usize {
        self.max_enrol_window
    }

    /// Timestamps of the test rows every model is scored on
    pub fn index_column(&self) -> &[NaiveDateTime] {
        &self.index_column
    }

    pub fn is_autoencoder_set(&self) -> bool {
        self.models.iter().any(|m| m.is_autoencoder())
    }

    pub fn is_fitted(&self) -> bool {
        self.models.iter().all(|m| m.is_fitted())
    }

    /// Fit every model on the training matrices, in parallel
    pub fn train(&mut self, data: &PreparedData) -> Result<()> {
        self.check_data(data)?;
        let split = data.data();
        let start = Instant::now();

        self.models
            .par_iter_mut()
            .map(|model| -> Result<()> {
                let model_start = Instant::now();
                model.fit(&split.x_train, &split.y_train)?;
                info!(
                    model = model.name(),
                    kind = model.kind(),
                    elapsed_secs = model_start.elapsed().as_secs_f64(),
                    "Model trained"
                );
                Ok(())
            })
            .collect::<Result<Vec<()>>>()?;

        info!(
            models = self.models.len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Model set trained"
        );
        Ok(())
    }

    /// Score every model on both sides of the split.
    ///
    /// Training scores use each model's own window; test predictions are cut
    /// to the common aligned rows before scoring.
    pub fn predict(&self, data: &PreparedData) -> Result<PredictionReport> {
        if self.is_autoencoder_set() {
            return Err(PipelineError::ConfigurationError(
                "autoencoders reconstruct features; use reconstruct instead of predict".to_string(),
            ));
        }

        self.check_data(data)?;
        let split = data.data();
        if split.x_test.nrows() != data.test_index().len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} test rows", data.test_index().len()),
                actual: format!("{} rows", split.x_test.nrows()),
            });
        }
        let rows = self.index_column.len();
        let actual = aligned_targets(&split.y_test, self.max_enrol_window)?;

        let models = self
            .models
            .iter()
            .map(|model| -> Result<ModelPrediction> {
                let window = model.enrol_window();

                let train_pred = model.predict(&split.x_train)?;
                let train_true = aligned_targets(&split.y_train, window)?;
                let metrics_train = ModelMetrics::compute_regression(&train_true, &train_pred)?;

                let predictions = align_tail(&model.predict(&split.x_test)?, rows)?;
                let metrics_test = ModelMetrics::compute_regression(&actual, &predictions)?;
                let deviations = &predictions - &actual;

                info!(
                    model = model.name(),
                    r2_train = metrics_train.r2,
                    r2_test = metrics_test.r2,
                    rmse_test = metrics_test.rmse,
                    "Model scored"
                );

                Ok(ModelPrediction {
                    name: model.name().to_string(),
                    kind: model.kind().to_string(),
                    enrol_window: window,
                    metrics_train,
                    metrics_test,
                    predictions,
                    deviations,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PredictionReport {
            index_column: self.index_column.clone(),
            target_columns: split.target_columns.clone(),
            models,
        })
    }

    /// Reconstruct the test features with the set's autoencoder
    pub fn reconstruct(&self, data: &PreparedData) -> Result<ReconstructionReport> {
        let autoencoder = self
            .models
            .iter()
            .find_map(|m| m.as_autoencoder())
            .ok_or_else(|| {
                PipelineError::ConfigurationError("model set holds no autoencoder".to_string())
            })?;

        self.check_data(data)?;
        let split = data.data();
        let reconstruction = autoencoder.reconstruct(&split.x_test)?;
        let errors = autoencoder.reconstruction_error(&split.x_test)?;

        info!(
            model = autoencoder.name(),
            rows = errors.len(),
            mean_error = errors.mean().unwrap_or(0.0),
            "Features reconstructed"
        );

        Ok(ReconstructionReport {
            name: autoencoder.name().to_string(),
            index_column: self.index_column.clone(),
            feature_columns: split.feature_columns.clone(),
            reconstruction,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnMeta, Dataset};
    use crate::pipeline::{Pipeline, PipelineConfig};
    use crate::training::{ModelOptions, DEFAULT_ENCODING_DIM};
    use chrono::NaiveDate;
    use polars::prelude::*;

    fn prepared() -> PreparedData {
        prepared_on(("2020-01-02 00:00:00", "2020-01-02 15:00:00"))
    }

    /// 40 hourly rows, trained on the first day and tested on `test`
    fn prepared_on(test: (&str, &str)) -> PreparedData {
        let n = 40;
        let v: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin()).collect();
        let u: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).cos()).collect();
        let w: Vec<f64> = v.iter().zip(&u).map(|(v, u)| 2.0 * v - u + 0.5).collect();
        let index = (0..n)
            .map(|i| {
                NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64)
            })
            .collect();
        let dataset = Dataset::new(
            index,
            df!("v" => &v, "u" => &u, "w" => &w).unwrap(),
            vec![
                ColumnMeta::new("v", "input", "-"),
                ColumnMeta::new("u", "input", "-"),
                ColumnMeta::new("w", "output", "-"),
            ],
        )
        .unwrap();
        let config = PipelineConfig::new(
            vec![("2020-01-01 00:00:00", "2020-01-01 23:00:00")],
            vec![test],
            vec!["w"],
        );
        Pipeline::new(config).prepare(&dataset).unwrap()
    }

    fn lstm(window: usize) -> ModelOptions {
        ModelOptions::lstm()
            .with_epochs(2)
            .with_batch_size(8)
            .with_verbose(0)
            .with_enrol_window(window)
    }

    #[test]
    fn test_rejects_invalid_sets() {
        let data = prepared();
        assert!(matches!(ModelSet::new(vec![], &data), Err(PipelineError::ConfigurationError(_))));

        let ae = Model::autoencoder_dropout("ae", 0.2, DEFAULT_ENCODING_DIM, ModelOptions::mlp());
        assert!(matches!(
            ModelSet::new(vec![Model::linear("lin"), ae], &data),
            Err(PipelineError::ConfigurationError(_))
        ));

        let twice = vec![
            Model::linear("m"),
            Model::linear_regularized("m", ModelOptions::mlp()),
        ];
        assert!(matches!(
            ModelSet::new(twice, &data),
            Err(PipelineError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_window_too_large_for_test_subset() {
        let data = prepared();
        let result = ModelSet::new(vec![Model::lstm("l", &[2], lstm(16))], &data);
        assert!(matches!(
            result,
            Err(PipelineError::AlignmentError { window: 16, rows: 16 })
        ));
    }

    #[test]
    fn test_index_column_is_test_tail() {
        let data = prepared();
        let models = vec![Model::linear("lin"), Model::lstm("l", &[2], lstm(3))];
        let set = ModelSet::new(models, &data).unwrap();
        assert_eq!(set.max_enrol_window(), 3);
        assert_eq!(set.index_column(), &data.test_index()[3..]);
    }

    #[test]
    fn test_predict_aligns_every_model() {
        let data = prepared();
        let models = vec![Model::linear("lin"), Model::lstm("l", &[2], lstm(3))];
        let mut set = ModelSet::new(models, &data).unwrap();
        set.train(&data).unwrap();
        assert!(set.is_fitted());

        let report = set.predict(&data).unwrap();
        assert_eq!(report.names(), vec!["lin", "l"]);
        assert_eq!(report.index_column.len(), 13);
        for model in &report.models {
            assert_eq!(model.predictions.dim(), (13, 1));
            assert_eq!(model.deviations.dim(), (13, 1));
        }

        let lin = report.get("lin").unwrap();
        assert!(lin.r2_train() > 0.99);
        assert!(lin.r2_test() > 0.99);
        assert!(lin.deviations.iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn test_autoencoder_set_reconstructs() {
        let data = prepared();
        let options = ModelOptions::mlp().with_epochs(5).with_early_stopping(None);
        let ae = Model::autoencoder_regularized("ae", 1e-3, 2, options);
        let mut set = ModelSet::new(vec![ae], &data).unwrap();
        set.train(&data).unwrap();

        assert!(matches!(set.predict(&data), Err(PipelineError::ConfigurationError(_))));

        let report = set.reconstruct(&data).unwrap();
        assert_eq!(report.reconstruction.dim(), (16, 2));
        assert_eq!(report.errors.len(), 16);
        assert_eq!(report.index_column, data.test_index());
    }

    #[test]
    fn test_reconstruct_requires_autoencoder() {
        let data = prepared();
        let set = ModelSet::new(vec![Model::linear("lin")], &data).unwrap();
        assert!(matches!(set.reconstruct(&data), Err(PipelineError::ConfigurationError(_))));
    }

    #[test]
    fn test_predict_rejects_shorter_test_split() {
        let data = prepared();
        let models = vec![Model::linear("lin"), Model::lstm("l", &[2], lstm(3))];
        let mut set = ModelSet::new(models, &data).unwrap();
        set.train(&data).unwrap();

        let short = prepared_on(("2020-01-02 00:00:00", "2020-01-02 01:00:00"));
        assert_eq!(short.test_index().len(), 2);
        assert!(matches!(
            set.predict(&short),
            Err(PipelineError::AlignmentError { window: 3, rows: 2 })
        ));
    }

    #[test]
    fn test_predict_rejects_shifted_test_split() {
        let data = prepared();
        let mut set = ModelSet::new(vec![Model::linear("lin")], &data).unwrap();
        set.train(&data).unwrap();

        let shifted = prepared_on(("2020-01-01 08:00:00", "2020-01-01 23:00:00"));
        assert_eq!(shifted.test_index().len(), data.test_index().len());
        assert!(matches!(set.predict(&shifted), Err(PipelineError::ShapeError { .. })));
        assert!(matches!(
            set.clone().train(&shifted),
            Err(PipelineError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_reconstruct_rejects_other_split() {
        let data = prepared();
        let options = ModelOptions::mlp().with_epochs(2).with_early_stopping(None);
        let ae = Model::autoencoder_regularized("ae", 1e-3, 2, options);
        let mut set = ModelSet::new(vec![ae], &data).unwrap();
        set.train(&data).unwrap();

        let other = prepared_on(("2020-01-02 04:00:00", "2020-01-02 15:00:00"));
        assert!(matches!(set.reconstruct(&other), Err(PipelineError::ShapeError { .. })));
    }
}
