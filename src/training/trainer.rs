//! Mini-batch training loop with early stopping

use super::config::{Loss, ModelOptions};
use super::optimizer::Optimizer;
use crate::error::{PipelineError, Result};
use ndarray::{Array, Array2, Axis, Dimension, RemoveAxis, Slice};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub(crate) type Rng64 = Xoshiro256PlusPlus;

/// Seeded generator, or one drawn from entropy when no seed is given
pub(crate) fn seeded(seed: Option<u64>) -> Rng64 {
    match seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// A differentiable model whose parameters are a flat list of matrices
pub(crate) trait GradientModel {
    /// Dimensionality of one input batch (rows first)
    type Dim: Dimension + RemoveAxis;

    fn params(&self) -> &[Array2<f64>];

    fn params_mut(&mut self) -> &mut [Array2<f64>];

    /// Inference output
    fn output(&self, x: &Array<f64, Self::Dim>) -> Array2<f64>;

    /// Training loss on a batch, including regularization, and its gradients
    fn loss_and_gradients(
        &self,
        x: &Array<f64, Self::Dim>,
        y: &Array2<f64>,
        loss: Loss,
        rng: &mut Rng64,
    ) -> (f64, Vec<Array2<f64>>);
}

/// Per-epoch record of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    /// Epoch whose parameters were kept
    pub best_epoch: usize,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }
}

/// Fit `model` on `(x, y)` according to `options`.
///
/// The trailing `validation_size` fraction of rows is held out and drives
/// early stopping; the leading rows are shuffled every epoch.
pub(crate) fn train<M: GradientModel>(
    model: &mut M,
    x: &Array<f64, M::Dim>,
    y: &Array2<f64>,
    options: &ModelOptions,
    name: &str,
    rng: &mut Rng64,
) -> Result<TrainingHistory> {
    let n_samples = x.len_of(Axis(0));
    if n_samples != y.nrows() {
        return Err(PipelineError::ShapeError {
            expected: format!("{} target rows", n_samples),
            actual: format!("{} target rows", y.nrows()),
        });
    }
    if n_samples == 0 {
        return Err(PipelineError::TrainingError(format!("{name}: no training rows")));
    }

    let mut val_size = (n_samples as f64 * options.validation_size) as usize;
    if val_size >= n_samples {
        val_size = 0;
    }
    let train_size = n_samples - val_size;

    let x_train = x.slice_axis(Axis(0), Slice::from(..train_size));
    let y_train = y.slice_axis(Axis(0), Slice::from(..train_size));
    let x_val = x.slice_axis(Axis(0), Slice::from(train_size..)).to_owned();
    let y_val = y.slice_axis(Axis(0), Slice::from(train_size..)).to_owned();

    let mut optimizer = Optimizer::new(options.optimizer, model.params());
    let mut history = TrainingHistory::default();
    let mut best_val_loss = f64::INFINITY;
    let mut best_params: Option<Vec<Array2<f64>>> = None;
    let mut patience_counter = 0;
    let batch_size = options.batch_size.max(1);

    for epoch in 0..options.epochs {
        let mut indices: Vec<usize> = (0..train_size).collect();
        indices.shuffle(rng);

        let mut epoch_loss = 0.0;
        let mut n_batches = 0;
        for batch in indices.chunks(batch_size) {
            let x_batch = x_train.select(Axis(0), batch);
            let y_batch = y_train.select(Axis(0), batch);

            let (batch_loss, grads) =
                model.loss_and_gradients(&x_batch, &y_batch, options.loss, rng);
            if !batch_loss.is_finite() {
                return Err(PipelineError::TrainingError(format!(
                    "{name}: loss diverged at epoch {epoch}"
                )));
            }
            optimizer.step(model.params_mut(), &grads);

            epoch_loss += batch_loss;
            n_batches += 1;
        }
        let epoch_loss = epoch_loss / n_batches.max(1) as f64;
        history.loss.push(epoch_loss);

        let val_loss = if val_size > 0 {
            let pred = model.output(&x_val);
            Some(options.loss.value(&pred, &y_val))
        } else {
            None
        };

        if options.verbose >= 1 {
            let metrics = epoch_metrics(model, &x_val, &y_val, options);
            info!(
                model = name,
                epoch,
                loss = epoch_loss,
                ?val_loss,
                metrics = %metrics,
                "Epoch complete"
            );
        } else {
            debug!(model = name, epoch, loss = epoch_loss, ?val_loss, "Epoch complete");
        }

        let Some(val_loss) = val_loss else {
            history.best_epoch = epoch;
            continue;
        };
        history.val_loss.push(val_loss);

        let Some(stopping) = options.early_stopping else {
            history.best_epoch = epoch;
            continue;
        };

        if val_loss < best_val_loss - stopping.min_delta {
            best_val_loss = val_loss;
            history.best_epoch = epoch;
            patience_counter = 0;
            if stopping.restore_best {
                best_params = Some(model.params().to_vec());
            }
        } else {
            patience_counter += 1;
            if patience_counter >= stopping.patience {
                history.stopped_early = true;
                break;
            }
        }
    }

    if let Some(params) = best_params {
        for (dst, src) in model.params_mut().iter_mut().zip(params) {
            *dst = src;
        }
    }

    info!(
        model = name,
        epochs = history.epochs(),
        best_epoch = history.best_epoch,
        stopped_early = history.stopped_early,
        loss = history.final_loss().unwrap_or(f64::NAN),
        "Training complete"
    );

    Ok(history)
}

fn epoch_metrics<M: GradientModel>(
    model: &M,
    x_val: &Array<f64, M::Dim>,
    y_val: &Array2<f64>,
    options: &ModelOptions,
) -> String {
    if y_val.nrows() == 0 || options.metrics.is_empty() {
        return String::new();
    }
    let pred = model.output(x_val);
    options
        .metrics
        .iter()
        .map(|m| format!("val_{}={:.6}", m.name(), m.value(&pred, y_val)))
        .collect::<Vec<_>>()
        .join(" ")
}
