//! Stacked LSTM regressor over lagged windows
//!
//! Each sample is the window of rows `[i - W, i]`, oldest first. The final
//! hidden state of the top layer passes through a leaky ReLU and a linear
//! output layer with one unit per target.

use super::config::{sigmoid, Activation, Loss, ModelOptions};
use super::models::{check_features, check_rows, Regressor};
use super::network::dropout_mask;
use super::trainer::{self, seeded, GradientModel, Rng64, TrainingHistory};
use crate::error::{PipelineError, Result};
use crate::timeseries::{aligned_targets, lagged_windows};
use ndarray::{s, Array2, Array3, Axis, Ix3};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// LSTM layers plus the output head.
///
/// Parameters per layer are `[W (in x 4h), U (h x 4h), b (1 x 4h)]` with gate
/// blocks ordered input, forget, candidate, output; the head adds
/// `[W_out, b_out]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmNetwork {
    units: Vec<usize>,
    activation: Activation,
    alpha: f64,
    dropout: f64,
    recurrent_dropout: f64,
    params: Vec<Array2<f64>>,
}

struct StepCache {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    zg: Array2<f64>,
    c: Array2<f64>,
}

struct LayerCache {
    steps: Vec<StepCache>,
    input_mask: Option<Array2<f64>>,
    recurrent_mask: Option<Array2<f64>>,
}

struct Forward {
    layers: Vec<LayerCache>,
    last_hidden: Array2<f64>,
    activated: Array2<f64>,
    output: Array2<f64>,
}

impl LstmNetwork {
    pub(crate) fn new(
        n_inputs: usize,
        units: &[usize],
        n_outputs: usize,
        options: &ModelOptions,
        recurrent_dropout: f64,
        rng: &mut Rng64,
    ) -> Self {
        let mut params = Vec::with_capacity(units.len() * 3 + 2);
        let mut n_in = n_inputs;
        for &h in units {
            params.push(uniform((n_in, 4 * h), rng));
            params.push(uniform((h, 4 * h), rng));
            let mut bias = Array2::zeros((1, 4 * h));
            bias.slice_mut(s![.., h..2 * h]).fill(1.0);
            params.push(bias);
            n_in = h;
        }
        params.push(uniform((n_in, n_outputs), rng));
        params.push(Array2::zeros((1, n_outputs)));

        Self {
            units: units.to_vec(),
            activation: options.activation,
            alpha: options.alpha,
            dropout: options.dropout,
            recurrent_dropout,
            params,
        }
    }

    pub fn units(&self) -> &[usize] {
        &self.units
    }

    pub fn n_inputs(&self) -> usize {
        self.params.first().map(|w| w.nrows()).unwrap_or(0)
    }

    /// Inference pass, no dropout
    pub fn forward(&self, x: &Array3<f64>) -> Array2<f64> {
        self.run(x, None).output
    }

    fn leaky(&self, v: f64) -> f64 {
        if v > 0.0 {
            v
        } else {
            self.alpha * v
        }
    }

    fn run(&self, x: &Array3<f64>, mut rng: Option<&mut Rng64>) -> Forward {
        let (batch, steps, _) = x.dim();
        let mut inputs: Vec<Array2<f64>> = (0..steps)
            .map(|t| x.slice(s![.., t, ..]).to_owned())
            .collect();
        let mut layers = Vec::with_capacity(self.units.len());

        for (l, &h) in self.units.iter().enumerate() {
            let n_in = self.params[3 * l].nrows();
            let (input_mask, recurrent_mask) = match rng.as_deref_mut() {
                Some(rng) => (
                    dropout_mask(ndarray::Ix2(batch, n_in), self.dropout, rng),
                    dropout_mask(ndarray::Ix2(batch, h), self.recurrent_dropout, rng),
                ),
                None => (None, None),
            };
            let (outputs, cache) = self.run_layer(l, &inputs, input_mask, recurrent_mask);
            layers.push(cache);
            inputs = outputs;
        }

        let top = self.units.last().copied().unwrap_or(0);
        let last_hidden = inputs.pop().unwrap_or_else(|| Array2::zeros((batch, top)));
        let activated = last_hidden.mapv(|v| self.leaky(v));
        let n = self.params.len();
        let output = activated.dot(&self.params[n - 2]) + &self.params[n - 1];

        Forward {
            layers,
            last_hidden,
            activated,
            output,
        }
    }

    fn run_layer(
        &self,
        l: usize,
        inputs: &[Array2<f64>],
        input_mask: Option<Array2<f64>>,
        recurrent_mask: Option<Array2<f64>>,
    ) -> (Vec<Array2<f64>>, LayerCache) {
        let (w, u, b) = (&self.params[3 * l], &self.params[3 * l + 1], &self.params[3 * l + 2]);
        let h = self.units[l];
        let batch = inputs.first().map(|x| x.nrows()).unwrap_or(0);
        let act = self.activation;

        let mut h_t = Array2::zeros((batch, h));
        let mut c_t = Array2::zeros((batch, h));
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut steps = Vec::with_capacity(inputs.len());

        for x_t in inputs {
            let x = match &input_mask {
                Some(m) => x_t * m,
                None => x_t.clone(),
            };
            let h_prev = match &recurrent_mask {
                Some(m) => &h_t * m,
                None => h_t.clone(),
            };

            let z = x.dot(w) + h_prev.dot(u) + b;
            let i = z.slice(s![.., 0..h]).mapv(sigmoid);
            let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
            let zg = z.slice(s![.., 2 * h..3 * h]).to_owned();
            let g = zg.mapv(|v| act.apply(v));
            let o = z.slice(s![.., 3 * h..]).mapv(sigmoid);

            let c = &f * &c_t + &i * &g;
            let h_new = &o * &c.mapv(|v| act.apply(v));

            steps.push(StepCache {
                x,
                h_prev,
                c_prev: c_t,
                i,
                f,
                g,
                o,
                zg,
                c: c.clone(),
            });
            c_t = c;
            h_t = h_new.clone();
            outputs.push(h_new);
        }

        (
            outputs,
            LayerCache {
                steps,
                input_mask,
                recurrent_mask,
            },
        )
    }

    /// Backpropagation through time for one layer.
    ///
    /// `d_outputs[t]` is the loss gradient with respect to the layer's hidden
    /// output at step `t`; returns the parameter gradients and the gradient
    /// with respect to each step input.
    fn backward_layer(
        &self,
        l: usize,
        cache: &LayerCache,
        d_outputs: Vec<Array2<f64>>,
    ) -> ([Array2<f64>; 3], Vec<Array2<f64>>) {
        let (w, u) = (&self.params[3 * l], &self.params[3 * l + 1]);
        let h = self.units[l];
        let act = self.activation;
        let batch = d_outputs.first().map(|d| d.nrows()).unwrap_or(0);

        let mut grad_w = Array2::zeros(w.raw_dim());
        let mut grad_u = Array2::zeros(u.raw_dim());
        let mut grad_b = Array2::zeros((1, 4 * h));
        let mut d_inputs = vec![Array2::zeros((batch, w.nrows())); d_outputs.len()];

        let mut dh_next: Array2<f64> = Array2::zeros((batch, h));
        let mut dc_next: Array2<f64> = Array2::zeros((batch, h));

        for t in (0..cache.steps.len()).rev() {
            let st = &cache.steps[t];
            let dh = &d_outputs[t] + &dh_next;

            let d_o = &dh * &st.c.mapv(|v| act.apply(v));
            let dc = &dh * &st.o * &st.c.mapv(|v| act.derivative(v)) + &dc_next;
            let d_i = &dc * &st.g;
            let d_g = &dc * &st.i;
            let d_f = &dc * &st.c_prev;
            dc_next = &dc * &st.f;

            let mut dz = Array2::zeros((batch, 4 * h));
            dz.slice_mut(s![.., 0..h]).assign(&(d_i * &st.i.mapv(|s| s * (1.0 - s))));
            dz.slice_mut(s![.., h..2 * h]).assign(&(d_f * &st.f.mapv(|s| s * (1.0 - s))));
            dz.slice_mut(s![.., 2 * h..3 * h]).assign(&(d_g * &st.zg.mapv(|v| act.derivative(v))));
            dz.slice_mut(s![.., 3 * h..]).assign(&(d_o * &st.o.mapv(|s| s * (1.0 - s))));

            grad_w += &st.x.t().dot(&dz);
            grad_u += &st.h_prev.t().dot(&dz);
            grad_b += &dz.sum_axis(Axis(0)).insert_axis(Axis(0));

            let mut dx = dz.dot(&w.t());
            if let Some(m) = &cache.input_mask {
                dx *= m;
            }
            d_inputs[t] = dx;

            let mut dh_prev = dz.dot(&u.t());
            if let Some(m) = &cache.recurrent_mask {
                dh_prev *= m;
            }
            dh_next = dh_prev;
        }

        ([grad_w, grad_u, grad_b], d_inputs)
    }
}

impl GradientModel for LstmNetwork {
    type Dim = Ix3;

    fn params(&self) -> &[Array2<f64>] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [Array2<f64>] {
        &mut self.params
    }

    fn output(&self, x: &Array3<f64>) -> Array2<f64> {
        self.forward(x)
    }

    fn loss_and_gradients(
        &self,
        x: &Array3<f64>,
        y: &Array2<f64>,
        loss: Loss,
        rng: &mut Rng64,
    ) -> (f64, Vec<Array2<f64>>) {
        let fwd = self.run(x, Some(rng));
        let value = loss.value(&fwd.output, y);
        let d_out = loss.gradient(&fwd.output, y);

        let n = self.params.len();
        let mut grads = vec![Array2::zeros((0, 0)); n];
        grads[n - 2] = fwd.activated.t().dot(&d_out);
        grads[n - 1] = d_out.sum_axis(Axis(0)).insert_axis(Axis(0));

        let alpha = self.alpha;
        let d_activated = d_out.dot(&self.params[n - 2].t());
        let d_last = d_activated * &fwd.last_hidden.mapv(|v| if v > 0.0 { 1.0 } else { alpha });

        let steps = x.dim().1;
        let batch = x.dim().0;
        let top = self.units.last().copied().unwrap_or(0);
        let mut d_outputs: Vec<Array2<f64>> =
            (0..steps).map(|_| Array2::zeros((batch, top))).collect();
        if let Some(last) = d_outputs.last_mut() {
            *last = d_last;
        }

        for l in (0..self.units.len()).rev() {
            let ([gw, gu, gb], d_inputs) = self.backward_layer(l, &fwd.layers[l], d_outputs);
            grads[3 * l] = gw;
            grads[3 * l + 1] = gu;
            grads[3 * l + 2] = gb;
            d_outputs = d_inputs;
        }

        (value, grads)
    }
}

fn uniform(shape: (usize, usize), rng: &mut Rng64) -> Array2<f64> {
    let scale = (6.0 / (shape.0 + shape.1).max(1) as f64).sqrt();
    Array2::from_shape_fn(shape, |_| rng.gen::<f64>() * 2.0 * scale - scale)
}

/// LSTM regressor with optional recurrent dropout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LSTMRegressor {
    name: String,
    units: Vec<usize>,
    use_recurrent_dropout: bool,
    options: ModelOptions,
    network: Option<LstmNetwork>,
    history: Option<TrainingHistory>,
}

impl LSTMRegressor {
    /// LSTM with input dropout only
    pub fn new(name: impl Into<String>, units: &[usize], options: ModelOptions) -> Self {
        Self {
            name: name.into(),
            units: units.to_vec(),
            use_recurrent_dropout: false,
            options,
            network: None,
            history: None,
        }
    }

    /// LSTM with both input and recurrent dropout
    pub fn recurrent(name: impl Into<String>, units: &[usize], options: ModelOptions) -> Self {
        Self {
            use_recurrent_dropout: true,
            ..Self::new(name, units, options)
        }
    }

    pub fn units(&self) -> &[usize] {
        &self.units
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn uses_recurrent_dropout(&self) -> bool {
        self.use_recurrent_dropout
    }

    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }
}

impl Regressor for LSTMRegressor {
    fn name(&self) -> &str {
        &self.name
    }

    fn enrol_window(&self) -> usize {
        self.options.enrol_window
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        self.options.validate()?;
        if self.units.is_empty() || self.units.iter().any(|&u| u == 0) {
            return Err(PipelineError::InvalidParameter {
                name: "units".to_string(),
                value: format!("{:?}", self.units),
                reason: "need at least one layer with at least one unit".to_string(),
            });
        }
        check_rows(x, y)?;

        let window = self.enrol_window();
        let samples = lagged_windows(x, window)?;
        let targets = aligned_targets(y, window)?;

        let recurrent_dropout = if self.use_recurrent_dropout {
            self.options.recurrent_dropout
        } else {
            0.0
        };
        let mut rng = seeded(self.options.random_state);
        let mut network = LstmNetwork::new(
            x.ncols(),
            &self.units,
            y.ncols(),
            &self.options,
            recurrent_dropout,
            &mut rng,
        );
        let history = trainer::train(
            &mut network,
            &samples,
            &targets,
            &self.options,
            &self.name,
            &mut rng,
        )?;

        self.network = Some(network);
        self.history = Some(history);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let network = self.network.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_features(network.n_inputs(), x)?;
        let samples = lagged_windows(x, self.enrol_window())?;
        Ok(network.forward(&samples))
    }

    fn is_fitted(&self) -> bool {
        self.network.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::config::OptimizerConfig;

    fn series(n: usize) -> (Array2<f64>, Array2<f64>) {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| (i as f64 * 0.3).sin());
        // target depends on the previous row
        let y = Array2::from_shape_fn((n, 1), |(i, _)| if i == 0 { 0.0 } else { x[[i - 1, 0]] });
        (x, y)
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut rng = seeded(Some(11));
        let options = ModelOptions::lstm()
            .with_activation(Activation::Tanh)
            .with_dropout(0.0);
        let mut net = LstmNetwork::new(2, &[3, 2], 1, &options, 0.0, &mut rng);
        let x = Array3::from_shape_fn((2, 3, 2), |(b, t, f)| {
            ((b + 2 * t + 3 * f) as f64 * 0.37).sin()
        });
        let y = ndarray::array![[0.5], [-0.25]];

        let (_, grads) = net.loss_and_gradients(&x, &y, Loss::MeanSquaredError, &mut rng);

        let eps = 1e-6;
        for p in 0..net.params.len() {
            let cols = net.params[p].ncols();
            for idx in 0..net.params[p].len() {
                let (r, c) = (idx / cols, idx % cols);
                let original = net.params[p][[r, c]];

                net.params[p][[r, c]] = original + eps;
                let plus = Loss::MeanSquaredError.value(&net.forward(&x), &y);
                net.params[p][[r, c]] = original - eps;
                let minus = Loss::MeanSquaredError.value(&net.forward(&x), &y);
                net.params[p][[r, c]] = original;

                let numeric = (plus - minus) / (2.0 * eps);
                assert!(
                    (numeric - grads[p][[r, c]]).abs() < 1e-5,
                    "param {} [{}, {}]: numeric {} analytic {}",
                    p, r, c, numeric, grads[p][[r, c]]
                );
            }
        }
    }

    #[test]
    fn test_prediction_rows_follow_window() {
        let (x, y) = series(30);
        let options = ModelOptions::lstm()
            .with_epochs(3)
            .with_enrol_window(4)
            .with_verbose(0);
        let mut model = LSTMRegressor::new("lstm", &[4], options);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.enrol_window(), 4);
        assert_eq!(model.predict(&x).unwrap().dim(), (26, 1));
    }

    #[test]
    fn test_lstm_learns_lagged_signal() {
        let (x, y) = series(120);
        let options = ModelOptions::lstm()
            .with_activation(Activation::Tanh)
            .with_epochs(200)
            .with_batch_size(16)
            .with_enrol_window(2)
            .with_dropout(0.0)
            .with_verbose(0)
            .with_early_stopping(None)
            .with_optimizer(OptimizerConfig::adam(0.01));
        let mut model = LSTMRegressor::new("lstm", &[8], options);
        model.fit(&x, &y).unwrap();

        assert!(model.score(&x, &y).unwrap() > 0.8);
    }

    #[test]
    fn test_recurrent_variant_uses_recurrent_dropout() {
        let (x, y) = series(20);
        let options = ModelOptions::lstm().with_epochs(2).with_verbose(0);
        let mut model = LSTMRegressor::recurrent("rec", &[3], options);
        assert!(model.uses_recurrent_dropout());
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap().nrows(), 19);
    }

    #[test]
    fn test_window_larger_than_data() {
        let (x, y) = series(3);
        let options = ModelOptions::lstm().with_enrol_window(5).with_epochs(1);
        let mut model = LSTMRegressor::new("lstm", &[2], options);
        assert!(matches!(model.fit(&x, &y), Err(PipelineError::AlignmentError { .. })));
    }
}
