//! Model catalog
//!
//! Every model the pipeline can train, behind one enum that dispatches to the
//! concrete regressors.

use super::autoencoder::{Autoencoder, AutoencoderRegularization};
use super::config::ModelOptions;
use super::ensemble::EnsembleRegressor;
use super::linear_models::{LinearRegression, RidgeCV};
use super::models::Regressor;
use super::neural_network::{MLPRegressor, MlpRegularization};
use super::recurrent::LSTMRegressor;
use crate::error::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Default hidden layer sizes for the MLP and LSTM constructors
pub const DEFAULT_LAYERS: [usize; 1] = [128];
pub const DEFAULT_DROPOUT_RATE: f64 = 0.2;
pub const DEFAULT_L1_RATE: f64 = 0.01;
pub const DEFAULT_L2_RATE: f64 = 0.01;
pub const DEFAULT_AUTOENCODER_L1_RATE: f64 = 1e-3;
pub const DEFAULT_ENCODING_DIM: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Model {
    Linear(LinearRegression),
    LinearRegularized(RidgeCV),
    Mlp(MLPRegressor),
    Lstm(LSTMRegressor),
    Ensemble(EnsembleRegressor),
    Autoencoder(Autoencoder),
}

impl Model {
    /// Ordinary least squares
    pub fn linear(name: impl Into<String>) -> Self {
        Model::Linear(LinearRegression::new(name))
    }

    /// Ridge regression with cross-validated strength; `options.test_size`
    /// sets the validation fraction of the folds
    pub fn linear_regularized(name: impl Into<String>, options: ModelOptions) -> Self {
        Model::LinearRegularized(RidgeCV::from_options(name, &options))
    }

    pub fn mlp(name: impl Into<String>, layers: &[usize], options: ModelOptions) -> Self {
        Model::Mlp(MLPRegressor::new(name, layers, options))
    }

    /// MLP with dropout after every hidden layer
    pub fn mlp_dropout(
        name: impl Into<String>,
        layers: &[usize],
        dropout_rate: f64,
        options: ModelOptions,
    ) -> Self {
        Model::Mlp(MLPRegressor::with_regularization(
            name,
            layers,
            MlpRegularization::Dropout { rate: dropout_rate },
            options,
        ))
    }

    /// MLP with L1/L2 kernel regularization on every hidden layer
    pub fn mlp_regularized(
        name: impl Into<String>,
        layers: &[usize],
        l1_rate: f64,
        l2_rate: f64,
        options: ModelOptions,
    ) -> Self {
        Model::Mlp(MLPRegressor::with_regularization(
            name,
            layers,
            MlpRegularization::Kernel { l1: l1_rate, l2: l2_rate },
            options,
        ))
    }

    /// LSTM with input dropout; `options.recurrent_dropout` is ignored
    pub fn lstm(name: impl Into<String>, units: &[usize], options: ModelOptions) -> Self {
        Model::Lstm(LSTMRegressor::new(name, units, options))
    }

    /// LSTM with input and recurrent dropout
    pub fn lstm_recurrent(name: impl Into<String>, units: &[usize], options: ModelOptions) -> Self {
        Model::Lstm(LSTMRegressor::recurrent(name, units, options))
    }

    /// Linear stacking of at least two non-autoencoder models
    pub fn ensemble(name: impl Into<String>, models: Vec<Model>) -> Result<Self> {
        Ok(Model::Ensemble(EnsembleRegressor::new(name, models)?))
    }

    pub fn autoencoder_regularized(
        name: impl Into<String>,
        l1_rate: f64,
        encoding_dim: usize,
        options: ModelOptions,
    ) -> Self {
        Model::Autoencoder(Autoencoder::new(
            name,
            encoding_dim,
            AutoencoderRegularization::Activity { l1: l1_rate },
            options,
        ))
    }

    pub fn autoencoder_dropout(
        name: impl Into<String>,
        dropout_rate: f64,
        encoding_dim: usize,
        options: ModelOptions,
    ) -> Self {
        Model::Autoencoder(Autoencoder::new(
            name,
            encoding_dim,
            AutoencoderRegularization::Dropout { rate: dropout_rate },
            options,
        ))
    }

    pub fn is_autoencoder(&self) -> bool {
        matches!(self, Model::Autoencoder(_))
    }

    /// Short label of the model family
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Linear(_) => "linear",
            Model::LinearRegularized(_) => "linear_regularized",
            Model::Mlp(_) => "mlp",
            Model::Lstm(_) => "lstm",
            Model::Ensemble(_) => "ensemble",
            Model::Autoencoder(_) => "autoencoder",
        }
    }

    pub fn as_autoencoder(&self) -> Option<&Autoencoder> {
        match self {
            Model::Autoencoder(ae) => Some(ae),
            _ => None,
        }
    }

    fn regressor(&self) -> Option<&dyn Regressor> {
        match self {
            Model::Linear(m) => Some(m),
            Model::LinearRegularized(m) => Some(m),
            Model::Mlp(m) => Some(m),
            Model::Lstm(m) => Some(m),
            Model::Ensemble(m) => Some(m),
            Model::Autoencoder(_) => None,
        }
    }

    fn regressor_mut(&mut self) -> Option<&mut dyn Regressor> {
        match self {
            Model::Linear(m) => Some(m),
            Model::LinearRegularized(m) => Some(m),
            Model::Mlp(m) => Some(m),
            Model::Lstm(m) => Some(m),
            Model::Ensemble(m) => Some(m),
            Model::Autoencoder(_) => None,
        }
    }
}

/// Autoencoders ignore `y` and are trained to reproduce `x`; their
/// predictions are reconstructions of `x`.
impl Regressor for Model {
    fn name(&self) -> &str {
        match self {
            Model::Autoencoder(ae) => ae.name(),
            other => other.regressor().map(|r| r.name()).unwrap_or_default(),
        }
    }

    fn enrol_window(&self) -> usize {
        self.regressor().map(|r| r.enrol_window()).unwrap_or(0)
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        match self {
            Model::Autoencoder(ae) => ae.fit(x),
            other => match other.regressor_mut() {
                Some(r) => r.fit(x, y),
                None => Ok(()),
            },
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Model::Autoencoder(ae) => ae.reconstruct(x),
            other => match other.regressor() {
                Some(r) => r.predict(x),
                None => Err(crate::error::PipelineError::ModelNotFitted),
            },
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            Model::Autoencoder(ae) => ae.is_fitted(),
            other => other.regressor().map(|r| r.is_fitted()).unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn test_constructors_and_kinds() {
        let options = ModelOptions::mlp();
        let models = vec![
            Model::linear("lin"),
            Model::linear_regularized("ridge", options.clone()),
            Model::mlp("mlp", &DEFAULT_LAYERS, options.clone()),
            Model::mlp_dropout("mlp_d", &DEFAULT_LAYERS, DEFAULT_DROPOUT_RATE, options.clone()),
            Model::mlp_regularized(
                "mlp_r",
                &DEFAULT_LAYERS,
                DEFAULT_L1_RATE,
                DEFAULT_L2_RATE,
                options.clone(),
            ),
            Model::lstm("lstm", &DEFAULT_LAYERS, ModelOptions::lstm()),
            Model::lstm_recurrent("lstm_r", &DEFAULT_LAYERS, ModelOptions::lstm()),
        ];
        let kinds: Vec<&str> = models.iter().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec!["linear", "linear_regularized", "mlp", "mlp", "mlp", "lstm", "lstm"]
        );
        assert_eq!(models[2].name(), "mlp");
        assert!(models.iter().all(|m| !m.is_fitted()));
    }

    #[test]
    fn test_enrol_windows() {
        assert_eq!(Model::linear("a").enrol_window(), 0);
        assert_eq!(Model::mlp("m", &[4], ModelOptions::lstm()).enrol_window(), 0);
        assert_eq!(Model::lstm("l", &[4], ModelOptions::lstm()).enrol_window(), 1);
        assert_eq!(
            Model::lstm("l", &[4], ModelOptions::lstm().with_enrol_window(6)).enrol_window(),
            6
        );
        let ae = Model::autoencoder_dropout(
            "ae",
            DEFAULT_DROPOUT_RATE,
            DEFAULT_ENCODING_DIM,
            ModelOptions::mlp(),
        );
        assert_eq!(ae.enrol_window(), 0);
        assert!(ae.is_autoencoder());
    }

    #[test]
    fn test_ensemble_validation() {
        assert!(Model::ensemble("e", vec![Model::linear("a"), Model::linear("b")]).is_ok());
        assert!(matches!(
            Model::ensemble("e", vec![]),
            Err(PipelineError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_model_serializes_with_type_tag() {
        let json = serde_json::to_string(&Model::linear("lin")).unwrap();
        assert!(json.contains("\"type\":\"linear\""));
    }
}
