//! Model training module
//!
//! Provides the regressors the pipeline compares:
//! - Linear models (OLS, cross-validated Ridge)
//! - Neural networks (MLP with optional dropout or L1/L2 regularization)
//! - Recurrent networks (stacked LSTM over lagged windows)
//! - Linear stacking ensembles
//! - Autoencoders for feature reconstruction

mod autoencoder;
mod catalog;
mod config;
mod ensemble;
mod models;
mod network;
mod optimizer;
mod trainer;
pub mod linear_models;
pub mod neural_network;
pub mod recurrent;

pub use autoencoder::{Autoencoder, AutoencoderRegularization};
pub use catalog::{
    Model, DEFAULT_AUTOENCODER_L1_RATE, DEFAULT_DROPOUT_RATE, DEFAULT_ENCODING_DIM, DEFAULT_L1_RATE,
    DEFAULT_L2_RATE, DEFAULT_LAYERS,
};
pub use config::{
    Activation, EarlyStopping, Loss, Metric, ModelOptions, OptimizerConfig, OptimizerKind,
};
pub use ensemble::EnsembleRegressor;
pub use linear_models::{LinearRegression, RidgeCV, RidgeRegression, DEFAULT_RIDGE_ALPHAS};
pub use models::{r2_score, ModelMetrics, Regressor};
pub use network::{DenseNetwork, LayerSpec};
pub use neural_network::{MLPRegressor, MlpRegularization};
pub use optimizer::Optimizer;
pub use recurrent::{LSTMRegressor, LstmNetwork};
pub use trainer::TrainingHistory;
