//! Parameter update rules for the neural models

use super::config::{OptimizerConfig, OptimizerKind};
use ndarray::Array2;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-7;

/// Stateful optimizer over a fixed list of parameter matrices
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    /// First moment (Adam) or velocity (SGD), per parameter
    first: Vec<Array2<f64>>,
    /// Second moment, Adam only
    second: Vec<Array2<f64>>,
    step: i32,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig, params: &[Array2<f64>]) -> Self {
        let zeros: Vec<Array2<f64>> = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
        let second = match config.kind {
            OptimizerKind::Adam => zeros.clone(),
            OptimizerKind::Sgd => Vec::new(),
        };
        Self {
            config,
            first: zeros,
            second,
            step: 0,
        }
    }

    /// Apply one update; `grads[i]` belongs to `params[i]`
    pub fn step(&mut self, params: &mut [Array2<f64>], grads: &[Array2<f64>]) {
        self.step += 1;
        let lr = self.config.learning_rate;

        match self.config.kind {
            OptimizerKind::Sgd => {
                let momentum = self.config.momentum;
                for ((param, grad), velocity) in
                    params.iter_mut().zip(grads).zip(self.first.iter_mut())
                {
                    velocity.zip_mut_with(grad, |v, &g| *v = momentum * *v - lr * g);
                    *param += &*velocity;
                }
            }
            OptimizerKind::Adam => {
                let bias1 = 1.0 - BETA1.powi(self.step);
                let bias2 = 1.0 - BETA2.powi(self.step);
                for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
                    let m = &mut self.first[i];
                    let v = &mut self.second[i];
                    m.zip_mut_with(grad, |m, &g| *m = BETA1 * *m + (1.0 - BETA1) * g);
                    v.zip_mut_with(grad, |v, &g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);

                    ndarray::Zip::from(param)
                        .and(&*m)
                        .and(&*v)
                        .for_each(|p, &m, &v| {
                            let m_hat = m / bias1;
                            let v_hat = v / bias2;
                            *p -= lr * m_hat / (v_hat.sqrt() + EPSILON);
                        });
                }
            }
        }
    }
}
