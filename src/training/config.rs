//! Training options shared by the neural models

use crate::error::{PipelineError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    Relu,
    /// Hyperbolic tangent
    Tanh,
    /// Sigmoid
    Sigmoid,
    /// Linear (identity)
    Linear,
}

impl Activation {
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Tanh => z.tanh(),
            Activation::Sigmoid => sigmoid(z),
            Activation::Linear => z,
        }
    }

    /// Derivative with respect to the pre-activation `z`
    pub fn derivative(self, z: f64) -> f64 {
        match self {
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => {
                let t = z.tanh();
                1.0 - t * t
            }
            Activation::Sigmoid => {
                let s = sigmoid(z);
                s * (1.0 - s)
            }
            Activation::Linear => 1.0,
        }
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Training loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    #[default]
    MeanSquaredError,
    MeanAbsoluteError,
}

impl Loss {
    /// Loss averaged over every element of the batch
    pub fn value(self, predicted: &Array2<f64>, target: &Array2<f64>) -> f64 {
        let n = predicted.len().max(1) as f64;
        let total: f64 = predicted
            .iter()
            .zip(target.iter())
            .map(|(p, t)| match self {
                Loss::MeanSquaredError => (p - t).powi(2),
                Loss::MeanAbsoluteError => (p - t).abs(),
            })
            .sum();
        total / n
    }

    /// Gradient of [`Loss::value`] with respect to `predicted`
    pub fn gradient(self, predicted: &Array2<f64>, target: &Array2<f64>) -> Array2<f64> {
        let n = predicted.len().max(1) as f64;
        let diff = predicted - target;
        match self {
            Loss::MeanSquaredError => diff.mapv(|d| 2.0 * d / n),
            Loss::MeanAbsoluteError => diff.mapv(|d| d.signum() / n),
        }
    }
}

/// Metrics reported alongside the loss during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[serde(alias = "mse")]
    MeanSquaredError,
    #[serde(alias = "mae")]
    MeanAbsoluteError,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::MeanSquaredError => "mse",
            Metric::MeanAbsoluteError => "mae",
        }
    }

    pub fn value(self, predicted: &Array2<f64>, target: &Array2<f64>) -> f64 {
        match self {
            Metric::MeanSquaredError => Loss::MeanSquaredError.value(predicted, target),
            Metric::MeanAbsoluteError => Loss::MeanAbsoluteError.value(predicted, target),
        }
    }
}

/// Gradient-based optimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    /// Stochastic gradient descent with momentum
    Sgd,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    pub learning_rate: f64,
    /// Momentum for SGD; ignored by Adam
    pub momentum: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Adam,
            learning_rate: 0.001,
            momentum: 0.9,
        }
    }
}

impl OptimizerConfig {
    pub fn sgd(learning_rate: f64, momentum: f64) -> Self {
        Self {
            kind: OptimizerKind::Sgd,
            learning_rate,
            momentum,
        }
    }

    pub fn adam(learning_rate: f64) -> Self {
        Self {
            kind: OptimizerKind::Adam,
            learning_rate,
            ..Self::default()
        }
    }
}

/// Stop training when the validation loss stops improving
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// Minimum decrease that counts as an improvement
    pub min_delta: f64,
    /// Restore the parameters of the best epoch when training ends
    pub restore_best: bool,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self {
            patience: 10,
            min_delta: 0.0,
            restore_best: true,
        }
    }
}

/// Options table for the neural models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Hidden activation; also the LSTM cell activation
    pub activation: Activation,
    pub loss: Loss,
    pub optimizer: OptimizerConfig,
    /// Metrics logged per epoch
    pub metrics: Vec<Metric>,
    /// Maximum number of epochs
    pub epochs: usize,
    pub batch_size: usize,
    /// 0 logs only a training summary, 1 or more logs every epoch
    pub verbose: u8,
    pub early_stopping: Option<EarlyStopping>,
    /// Lag depth; only recurrent models look back
    pub enrol_window: usize,
    /// Trailing fraction of training rows held out for early stopping
    pub validation_size: f64,
    /// Trailing fraction held out when a model selects its own hyperparameters
    pub test_size: f64,
    /// Leaky-ReLU slope applied to recurrent outputs
    pub alpha: f64,
    /// Input dropout of recurrent layers
    pub dropout: f64,
    /// Dropout on the recurrent state
    pub recurrent_dropout: f64,
    /// Random seed for initialization, shuffling and dropout masks
    pub random_state: Option<u64>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self::mlp()
    }
}

impl ModelOptions {
    /// Defaults for the feedforward models
    pub fn mlp() -> Self {
        Self {
            activation: Activation::Relu,
            loss: Loss::MeanSquaredError,
            optimizer: OptimizerConfig::default(),
            metrics: vec![Metric::MeanSquaredError],
            epochs: 1000,
            batch_size: 32,
            verbose: 0,
            early_stopping: Some(EarlyStopping::default()),
            enrol_window: 0,
            validation_size: 0.2,
            test_size: 0.2,
            alpha: 0.5,
            dropout: 0.0,
            recurrent_dropout: 0.0,
            random_state: Some(42),
        }
    }

    /// Defaults for the recurrent models
    pub fn lstm() -> Self {
        Self {
            epochs: 500,
            batch_size: 64,
            verbose: 1,
            enrol_window: 1,
            dropout: 0.2,
            recurrent_dropout: 0.2,
            ..Self::mlp()
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_early_stopping(mut self, early_stopping: Option<EarlyStopping>) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    pub fn with_enrol_window(mut self, window: usize) -> Self {
        self.enrol_window = window;
        self
    }

    pub fn with_validation_size(mut self, size: f64) -> Self {
        self.validation_size = size;
        self
    }

    pub fn with_test_size(mut self, size: f64) -> Self {
        self.test_size = size;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_recurrent_dropout(mut self, dropout: f64) -> Self {
        self.recurrent_dropout = dropout;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    /// Reject option values no model can train with
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(invalid("epochs", self.epochs, "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", self.batch_size, "must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.validation_size) {
            return Err(invalid("validation_size", self.validation_size, "must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.test_size) {
            return Err(invalid("test_size", self.test_size, "must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid("dropout", self.dropout, "must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.recurrent_dropout) {
            return Err(invalid("recurrent_dropout", self.recurrent_dropout, "must be in [0, 1)"));
        }
        let lr = self.optimizer.learning_rate;
        if !lr.is_finite() || lr <= 0.0 {
            return Err(invalid("learning_rate", self.optimizer.learning_rate, "must be positive"));
        }
        Ok(())
    }
}

pub(crate) fn invalid<V: ToString>(name: &str, value: V, reason: &str) -> PipelineError {
    PipelineError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mlp_defaults() {
        let options = ModelOptions::mlp();
        assert_eq!(options.activation, Activation::Relu);
        assert_eq!(options.loss, Loss::MeanSquaredError);
        assert_eq!(options.optimizer.kind, OptimizerKind::Adam);
        assert_eq!(options.epochs, 1000);
        assert_eq!(options.batch_size, 32);
        assert_eq!(options.verbose, 0);
        assert_eq!(options.enrol_window, 0);
        assert_eq!(options.validation_size, 0.2);
        assert_eq!(options.test_size, 0.2);
        assert_eq!(options.alpha, 0.5);
    }

    #[test]
    fn test_lstm_defaults() {
        let options = ModelOptions::lstm();
        assert_eq!(options.epochs, 500);
        assert_eq!(options.batch_size, 64);
        assert_eq!(options.verbose, 1);
        assert_eq!(options.enrol_window, 1);
        assert_eq!(options.dropout, 0.2);
        assert_eq!(options.recurrent_dropout, 0.2);
        assert_eq!(options.alpha, 0.5);
    }

    #[test]
    fn test_builder_pattern() {
        let options = ModelOptions::lstm()
            .with_epochs(5)
            .with_enrol_window(3)
            .with_optimizer(OptimizerConfig::sgd(0.01, 0.9));
        assert_eq!(options.epochs, 5);
        assert_eq!(options.enrol_window, 3);
        assert_eq!(options.optimizer.kind, OptimizerKind::Sgd);
    }

    #[test]
    fn test_validate() {
        assert!(ModelOptions::mlp().validate().is_ok());
        assert!(ModelOptions::mlp().with_batch_size(0).validate().is_err());
        assert!(matches!(
            ModelOptions::lstm().with_dropout(1.0).validate(),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"epochs": 12, "activation": "tanh", "metrics": ["mae"]}"#;
        let options: ModelOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.epochs, 12);
        assert_eq!(options.activation, Activation::Tanh);
        assert_eq!(options.metrics, vec![Metric::MeanAbsoluteError]);
        assert_eq!(options.batch_size, 32);
    }

    #[test]
    fn test_loss_gradient() {
        let p = array![[1.0, 2.0]];
        let t = array![[0.0, 2.0]];
        assert_eq!(Loss::MeanSquaredError.value(&p, &t), 0.5);
        assert_eq!(Loss::MeanSquaredError.gradient(&p, &t), array![[1.0, 0.0]]);
        assert_eq!(Loss::MeanAbsoluteError.value(&p, &t), 0.5);
    }

    #[test]
    fn test_activation_derivatives() {
        assert_eq!(Activation::Relu.apply(-1.0), 0.0);
        assert_eq!(Activation::Relu.derivative(2.0), 1.0);
        assert!((Activation::Sigmoid.derivative(0.0) - 0.25).abs() < 1e-12);
        assert!((Activation::Tanh.derivative(0.0) - 1.0).abs() < 1e-12);
    }
}
