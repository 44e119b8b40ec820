//! Neural Network (Multi-Layer Perceptron) regressors
//!
//! Feedforward networks with a linear output layer of one unit per target.
//! The hidden stack comes in three flavors: plain, dropout after every hidden
//! layer, or L1/L2 kernel regularization on every hidden layer.

use super::config::{Activation, ModelOptions};
use super::models::{check_features, check_rows, Regressor};
use super::network::{DenseNetwork, LayerSpec};
use super::trainer::{self, seeded, TrainingHistory};
use crate::error::{PipelineError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Regularization applied to the hidden layers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MlpRegularization {
    None,
    Dropout { rate: f64 },
    Kernel { l1: f64, l2: f64 },
}

/// Multi-Layer Perceptron Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPRegressor {
    name: String,
    hidden_layers: Vec<usize>,
    regularization: MlpRegularization,
    options: ModelOptions,
    network: Option<DenseNetwork>,
    history: Option<TrainingHistory>,
}

impl MLPRegressor {
    pub fn new(name: impl Into<String>, hidden_layers: &[usize], options: ModelOptions) -> Self {
        Self::with_regularization(name, hidden_layers, MlpRegularization::None, options)
    }

    pub fn with_regularization(
        name: impl Into<String>,
        hidden_layers: &[usize],
        regularization: MlpRegularization,
        options: ModelOptions,
    ) -> Self {
        Self {
            name: name.into(),
            hidden_layers: hidden_layers.to_vec(),
            regularization,
            // feedforward models never look back
            options: options.with_enrol_window(0),
            network: None,
            history: None,
        }
    }

    pub fn hidden_layers(&self) -> &[usize] {
        &self.hidden_layers
    }

    pub fn regularization(&self) -> MlpRegularization {
        self.regularization
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }

    fn layer_specs(&self, n_outputs: usize) -> Vec<LayerSpec> {
        let mut specs: Vec<LayerSpec> = self
            .hidden_layers
            .iter()
            .map(|&units| {
                let spec = LayerSpec::dense(units, self.options.activation);
                match self.regularization {
                    MlpRegularization::None => spec,
                    MlpRegularization::Dropout { rate } => spec.with_dropout(rate),
                    MlpRegularization::Kernel { l1, l2 } => spec.with_kernel_regularizer(l1, l2),
                }
            })
            .collect();
        specs.push(LayerSpec::dense(n_outputs, Activation::Linear));
        specs
    }

    fn validate(&self) -> Result<()> {
        self.options.validate()?;
        if self.hidden_layers.iter().any(|&u| u == 0) {
            return Err(PipelineError::InvalidParameter {
                name: "layers".to_string(),
                value: format!("{:?}", self.hidden_layers),
                reason: "every layer needs at least one unit".to_string(),
            });
        }
        match self.regularization {
            MlpRegularization::Dropout { rate } if !(0.0..1.0).contains(&rate) => {
                Err(PipelineError::InvalidParameter {
                    name: "dropout_rate".to_string(),
                    value: rate.to_string(),
                    reason: "must be in [0, 1)".to_string(),
                })
            }
            MlpRegularization::Kernel { l1, l2 } if l1 < 0.0 || l2 < 0.0 => {
                Err(PipelineError::InvalidParameter {
                    name: "l1_rate/l2_rate".to_string(),
                    value: format!("{l1}/{l2}"),
                    reason: "must be non-negative".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Regressor for MLPRegressor {
    fn name(&self) -> &str {
        &self.name
    }

    fn enrol_window(&self) -> usize {
        0
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        self.validate()?;
        check_rows(x, y)?;

        let mut rng = seeded(self.options.random_state);
        let mut network = DenseNetwork::new(x.ncols(), self.layer_specs(y.ncols()), &mut rng);
        let history = trainer::train(&mut network, x, y, &self.options, &self.name, &mut rng)?;

        self.network = Some(network);
        self.history = Some(history);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let network = self.network.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_features(network.n_inputs(), x)?;
        Ok(network.forward(x))
    }

    fn is_fitted(&self) -> bool {
        self.network.is_some()
    }
}
