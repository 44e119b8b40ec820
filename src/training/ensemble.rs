//! Linear stacking of member regressors

use super::catalog::Model;
use super::linear_models::LinearRegression;
use super::models::Regressor;
use crate::error::{PipelineError, Result};
use crate::timeseries::{align_tail, aligned_targets, max_enrol_window};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Combines member predictions with a linear regressor.
///
/// Member outputs are aligned to the largest member window before they are
/// stacked side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleRegressor {
    name: String,
    members: Vec<Model>,
    combiner: LinearRegression,
}

impl EnsembleRegressor {
    /// Requires at least two members, none of them an autoencoder
    pub fn new(name: impl Into<String>, members: Vec<Model>) -> Result<Self> {
        let name = name.into();
        if members.len() < 2 {
            return Err(PipelineError::ConfigurationError(format!(
                "ensemble {name} needs at least two models, got {}",
                members.len()
            )));
        }
        if let Some(ae) = members.iter().find(|m| m.is_autoencoder()) {
            return Err(PipelineError::ConfigurationError(format!(
                "autoencoder {} cannot be part of ensemble {name}",
                ae.name()
            )));
        }
        let combiner = LinearRegression::new(format!("{name}/combiner"));
        Ok(Self {
            name,
            members,
            combiner,
        })
    }

    pub fn members(&self) -> &[Model] {
        &self.members
    }

    /// Member predictions side by side, `n - window` rows
    fn stacked_predictions(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let window = self.enrol_window();
        let rows = x.nrows().checked_sub(window).ok_or(PipelineError::AlignmentError {
            window,
            rows: x.nrows(),
        })?;

        let columns = self
            .members
            .iter()
            .map(|m| align_tail(&m.predict(x)?, rows))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<ArrayView2<f64>> = columns.iter().map(|c| c.view()).collect();
        Ok(concatenate(Axis(1), &views)?)
    }
}

impl Regressor for EnsembleRegressor {
    fn name(&self) -> &str {
        &self.name
    }

    fn enrol_window(&self) -> usize {
        max_enrol_window(self.members.iter().map(|m| m.enrol_window()))
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        let targets = aligned_targets(y, self.enrol_window())?;

        self.members
            .par_iter_mut()
            .map(|m| m.fit(x, y))
            .collect::<Result<Vec<()>>>()?;

        let stacked = self.stacked_predictions(x)?;
        self.combiner.fit(&stacked, &targets)?;

        info!(
            model = %self.name,
            members = self.members.len(),
            window = self.enrol_window(),
            "Ensemble fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.combiner.is_fitted() {
            return Err(PipelineError::ModelNotFitted);
        }
        let stacked = self.stacked_predictions(x)?;
        self.combiner.predict(&stacked)
    }

    fn is_fitted(&self) -> bool {
        self.combiner.is_fitted() && self.members.iter().all(|m| m.is_fitted())
    }
}
