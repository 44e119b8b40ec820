//! Autoencoders that reconstruct the feature matrix
//!
//! One bottleneck layer of `encoding_dim` units followed by a linear decoder
//! back to the input width. The bottleneck is regularized either with an L1
//! activity penalty or with dropout.

use super::config::{Activation, ModelOptions};
use super::models::check_features;
use super::network::{DenseNetwork, LayerSpec};
use super::trainer::{self, seeded, TrainingHistory};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AutoencoderRegularization {
    /// L1 penalty on the encoding
    Activity { l1: f64 },
    Dropout { rate: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Autoencoder {
    name: String,
    encoding_dim: usize,
    regularization: AutoencoderRegularization,
    options: ModelOptions,
    network: Option<DenseNetwork>,
    history: Option<TrainingHistory>,
}

impl Autoencoder {
    pub fn new(
        name: impl Into<String>,
        encoding_dim: usize,
        regularization: AutoencoderRegularization,
        options: ModelOptions,
    ) -> Self {
        Self {
            name: name.into(),
            encoding_dim,
            regularization,
            options: options.with_enrol_window(0),
            network: None,
            history: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoding_dim(&self) -> usize {
        self.encoding_dim
    }

    pub fn regularization(&self) -> AutoencoderRegularization {
        self.regularization
    }

    pub fn is_fitted(&self) -> bool {
        self.network.is_some()
    }

    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }

    /// Train the network to reproduce `x`
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        self.options.validate()?;
        if self.encoding_dim == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "encoding_dim".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let encoder = LayerSpec::dense(self.encoding_dim, self.options.activation);
        let encoder = match self.regularization {
            AutoencoderRegularization::Activity { l1 } => encoder.with_activity_l1(l1),
            AutoencoderRegularization::Dropout { rate } => encoder.with_dropout(rate),
        };
        let layers = vec![encoder, LayerSpec::dense(x.ncols(), Activation::Linear)];

        let mut rng = seeded(self.options.random_state);
        let mut network = DenseNetwork::new(x.ncols(), layers, &mut rng);
        let history = trainer::train(&mut network, x, x, &self.options, &self.name, &mut rng)?;

        self.network = Some(network);
        self.history = Some(history);
        Ok(())
    }

    /// Reconstruction of `x`, same shape as `x`
    pub fn reconstruct(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let network = self.network.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_features(network.n_inputs(), x)?;
        Ok(network.forward(x))
    }

    /// Bottleneck representation of `x`
    pub fn encode(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let network = self.network.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_features(network.n_inputs(), x)?;
        Ok(network.forward_partial(x, 1))
    }

    /// Mean squared reconstruction error per row
    pub fn reconstruction_error(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let reconstructed = self.reconstruct(x)?;
        let squared = (&reconstructed - x).mapv(|e| e * e);
        Ok(squared
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(x.nrows())))
    }
}
