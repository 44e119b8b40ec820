//! Feedforward network core shared by the MLP regressors and autoencoders

use super::config::{Activation, Loss};
use super::trainer::{GradientModel, Rng64};
use ndarray::{Array2, Axis, Ix2};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// One dense layer: units, activation and its regularizers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
    /// Dropout applied to the layer output while training
    pub dropout: f64,
    /// L1 penalty on the kernel
    pub kernel_l1: f64,
    /// L2 penalty on the kernel
    pub kernel_l2: f64,
    /// L1 penalty on the layer output
    pub activity_l1: f64,
}

impl LayerSpec {
    pub fn dense(units: usize, activation: Activation) -> Self {
        Self {
            units,
            activation,
            dropout: 0.0,
            kernel_l1: 0.0,
            kernel_l2: 0.0,
            activity_l1: 0.0,
        }
    }

    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout = rate;
        self
    }

    pub fn with_kernel_regularizer(mut self, l1: f64, l2: f64) -> Self {
        self.kernel_l1 = l1;
        self.kernel_l2 = l2;
        self
    }

    pub fn with_activity_l1(mut self, l1: f64) -> Self {
        self.activity_l1 = l1;
        self
    }
}

/// Dense network with parameters laid out as `[W0, b0, W1, b1, ...]`.
///
/// Biases are stored as `1 x units` matrices so every parameter shares one
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    layers: Vec<LayerSpec>,
    params: Vec<Array2<f64>>,
}

struct LayerCache {
    input: Array2<f64>,
    z: Array2<f64>,
    output: Array2<f64>,
    mask: Option<Array2<f64>>,
}

impl DenseNetwork {
    /// Xavier/Glorot uniform initialization
    pub(crate) fn new(n_inputs: usize, layers: Vec<LayerSpec>, rng: &mut Rng64) -> Self {
        let mut params = Vec::with_capacity(layers.len() * 2);
        let mut n_in = n_inputs;
        for layer in &layers {
            let n_out = layer.units;
            let scale = (6.0 / (n_in + n_out).max(1) as f64).sqrt();
            params.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen::<f64>() * 2.0 * scale - scale
            }));
            params.push(Array2::zeros((1, n_out)));
            n_in = n_out;
        }
        Self { layers, params }
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn n_inputs(&self) -> usize {
        self.params.first().map(|w| w.nrows()).unwrap_or(0)
    }

    pub fn n_outputs(&self) -> usize {
        self.layers.last().map(|l| l.units).unwrap_or(0)
    }

    /// Inference pass, no dropout
    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut a = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = a.dot(&self.params[2 * i]) + &self.params[2 * i + 1];
            a = z.mapv(|v| layer.activation.apply(v));
        }
        a
    }

    /// Output of the first `n` layers
    pub fn forward_partial(&self, x: &Array2<f64>, n: usize) -> Array2<f64> {
        let mut a = x.to_owned();
        for (i, layer) in self.layers.iter().take(n).enumerate() {
            let z = a.dot(&self.params[2 * i]) + &self.params[2 * i + 1];
            a = z.mapv(|v| layer.activation.apply(v));
        }
        a
    }

    fn forward_train(&self, x: &Array2<f64>, rng: &mut Rng64) -> Vec<LayerCache> {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut a = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = a.dot(&self.params[2 * i]) + &self.params[2 * i + 1];
            let output = z.mapv(|v| layer.activation.apply(v));
            let mask = dropout_mask(output.raw_dim(), layer.dropout, rng);
            let next = match &mask {
                Some(m) => &output * m,
                None => output.clone(),
            };
            caches.push(LayerCache {
                input: a,
                z,
                output,
                mask,
            });
            a = next;
        }
        caches
    }

    /// Regularization penalty added to the data loss
    fn penalty(&self, caches: &[LayerCache]) -> f64 {
        let mut total = 0.0;
        for (i, layer) in self.layers.iter().enumerate() {
            let w = &self.params[2 * i];
            if layer.kernel_l1 > 0.0 {
                total += layer.kernel_l1 * w.mapv(f64::abs).sum();
            }
            if layer.kernel_l2 > 0.0 {
                total += layer.kernel_l2 * w.mapv(|v| v * v).sum();
            }
            if layer.activity_l1 > 0.0 {
                let batch = caches[i].output.nrows().max(1) as f64;
                total += layer.activity_l1 * caches[i].output.mapv(f64::abs).sum() / batch;
            }
        }
        total
    }

    /// Backpropagate `d_out`, the loss gradient with respect to the network output
    fn backward(&self, caches: &[LayerCache], d_out: Array2<f64>) -> Vec<Array2<f64>> {
        let mut grads = vec![Array2::zeros((0, 0)); self.params.len()];
        let mut delta = d_out;

        for i in (0..self.layers.len()).rev() {
            let layer = &self.layers[i];
            let cache = &caches[i];

            if let Some(mask) = &cache.mask {
                delta = delta * mask;
            }
            if layer.activity_l1 > 0.0 {
                let batch = cache.output.nrows().max(1) as f64;
                let scale = layer.activity_l1 / batch;
                delta.zip_mut_with(&cache.output, |d, &o| *d += scale * sign(o));
            }

            let activation = layer.activation;
            let dz = delta * cache.z.mapv(|v| activation.derivative(v));
            let w = &self.params[2 * i];

            let mut grad_w = cache.input.t().dot(&dz);
            if layer.kernel_l1 > 0.0 || layer.kernel_l2 > 0.0 {
                let (l1, l2) = (layer.kernel_l1, layer.kernel_l2);
                grad_w.zip_mut_with(w, |g, &v| *g += l1 * sign(v) + 2.0 * l2 * v);
            }
            grads[2 * i] = grad_w;
            grads[2 * i + 1] = dz.sum_axis(Axis(0)).insert_axis(Axis(0));

            delta = dz.dot(&w.t());
        }

        grads
    }
}

impl GradientModel for DenseNetwork {
    type Dim = Ix2;

    fn params(&self) -> &[Array2<f64>] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [Array2<f64>] {
        &mut self.params
    }

    fn output(&self, x: &Array2<f64>) -> Array2<f64> {
        self.forward(x)
    }

    fn loss_and_gradients(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        loss: Loss,
        rng: &mut Rng64,
    ) -> (f64, Vec<Array2<f64>>) {
        let caches = self.forward_train(x, rng);
        let out = match caches.last() {
            Some(c) => match &c.mask {
                Some(m) => &c.output * m,
                None => c.output.clone(),
            },
            None => x.to_owned(),
        };
        let value = loss.value(&out, y) + self.penalty(&caches);
        let grads = self.backward(&caches, loss.gradient(&out, y));
        (value, grads)
    }
}

/// Subgradient of `|v|`
pub(crate) fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Inverted dropout mask, `None` when `rate` is zero
pub(crate) fn dropout_mask(dim: Ix2, rate: f64, rng: &mut Rng64) -> Option<Array2<f64>> {
    if rate <= 0.0 {
        return None;
    }
    let keep = 1.0 - rate;
    Some(Array2::from_shape_fn(dim, |_| {
        if rng.gen::<f64>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::trainer::seeded;
    use ndarray::array;

    #[test]
    fn test_shapes() {
        let mut rng = seeded(Some(1));
        let net = DenseNetwork::new(
            3,
            vec![LayerSpec::dense(4, Activation::Relu), LayerSpec::dense(2, Activation::Linear)],
            &mut rng,
        );
        assert_eq!(net.n_inputs(), 3);
        assert_eq!(net.n_outputs(), 2);
        assert_eq!(net.params().len(), 4);
        let out = net.forward(&Array2::zeros((5, 3)));
        assert_eq!(out.dim(), (5, 2));
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut rng = seeded(Some(7));
        let mut net = DenseNetwork::new(
            2,
            vec![
                LayerSpec::dense(3, Activation::Tanh).with_kernel_regularizer(0.01, 0.01),
                LayerSpec::dense(1, Activation::Linear),
            ],
            &mut rng,
        );
        let x = array![[0.5, -1.0], [1.5, 0.3], [-0.7, 0.9]];
        let y = array![[1.0], [0.0], [-1.0]];

        let (_, grads) = net.loss_and_gradients(&x, &y, Loss::MeanSquaredError, &mut rng);

        let eps = 1e-6;
        for p in 0..net.params.len() {
            for idx in 0..net.params[p].len() {
                let (r, c) = (idx / net.params[p].ncols(), idx % net.params[p].ncols());
                let original = net.params[p][[r, c]];

                net.params[p][[r, c]] = original + eps;
                let (plus, _) = net.loss_and_gradients(&x, &y, Loss::MeanSquaredError, &mut rng);
                net.params[p][[r, c]] = original - eps;
                let (minus, _) = net.loss_and_gradients(&x, &y, Loss::MeanSquaredError, &mut rng);
                net.params[p][[r, c]] = original;

                let numeric = (plus - minus) / (2.0 * eps);
                let analytic = grads[p][[r, c]];
                assert!(
                    (numeric - analytic).abs() < 1e-4,
                    "param {} [{}, {}]: numeric {} analytic {}",
                    p, r, c, numeric, analytic
                );
            }
        }
    }

    #[test]
    fn test_dropout_mask() {
        let mut rng = seeded(Some(3));
        assert!(dropout_mask(Ix2(2, 2), 0.0, &mut rng).is_none());
        let mask = dropout_mask(Ix2(50, 50), 0.5, &mut rng).unwrap();
        assert!(mask.iter().all(|&v| v == 0.0 || v == 2.0));
        let kept = mask.iter().filter(|&&v| v > 0.0).count();
        assert!(kept > 1000 && kept < 1500);
    }
}
