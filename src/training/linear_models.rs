//! Linear model implementations

use super::config::ModelOptions;
use super::models::{check_features, check_rows, Regressor};
use crate::error::{PipelineError, Result};
use crate::timeseries::{TimeSeriesCV, TimeSeriesFold};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Retries once with a small diagonal ridge if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    if let Some(l) = cholesky_factor(a) {
        return Some(cholesky_substitute(&l, b));
    }

    // Not positive definite: add regularization and retry
    let mut a_reg = a.clone();
    let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
    for k in 0..n {
        a_reg[[k, k]] += ridge.max(1e-12);
    }
    cholesky_factor(&a_reg).map(|l| cholesky_substitute(&l, b))
}

/// Lower-triangular `L` with `A = L * L^T`, or `None` if `A` is not positive definite
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn cholesky_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Matrix inversion using Gauss-Jordan elimination (fallback)
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    // Augmented matrix [M | I]
    let mut aug = Array2::zeros((n, 2 * n));
    aug.slice_mut(s![.., ..n]).assign(m);
    for i in 0..n {
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }

        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }

        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    Some(aug.slice(s![.., n..]).to_owned())
}

/// Solve `(X^T X + alpha * I) W = X^T Y` for every target column of `Y`.
///
/// Cholesky first, Gauss-Jordan as the fallback.
fn solve_normal_equations(x: &Array2<f64>, y: &Array2<f64>, alpha: f64) -> Result<Array2<f64>> {
    let n_features = x.ncols();
    let mut xtx = x.t().dot(x);
    for i in 0..n_features {
        xtx[[i, i]] += alpha;
    }
    let xty = x.t().dot(y);

    let mut coefficients = Array2::zeros((n_features, y.ncols()));
    let mut inverse: Option<Array2<f64>> = None;

    for (k, rhs) in xty.axis_iter(Axis(1)).enumerate() {
        let rhs = rhs.to_owned();
        let column = match cholesky_solve(&xtx, &rhs) {
            Some(col) => col,
            None => {
                if inverse.is_none() {
                    inverse = matrix_inverse(&xtx);
                }
                match &inverse {
                    Some(inv) => inv.dot(&rhs),
                    None => {
                        return Err(PipelineError::ComputationError(
                            "Matrix is singular, cannot solve least squares".to_string(),
                        ))
                    }
                }
            }
        };
        coefficients.column_mut(k).assign(&column);
    }

    Ok(coefficients)
}

/// Fitted weights of a multi-output linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearFit {
    /// `n_features x n_targets`
    coefficients: Array2<f64>,
    /// One intercept per target
    intercept: Array1<f64>,
}

impl LinearFit {
    fn solve(x: &Array2<f64>, y: &Array2<f64>, alpha: f64, fit_intercept: bool) -> Result<Self> {
        check_rows(x, y)?;
        if x.nrows() == 0 {
            return Err(PipelineError::TrainingError("no training rows".to_string()));
        }

        if !fit_intercept {
            let coefficients = solve_normal_equations(x, y, alpha)?;
            return Ok(Self {
                intercept: Array1::zeros(y.ncols()),
                coefficients,
            });
        }

        // Center data when fitting intercept
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(y.ncols()));
        let x_centered = x - &x_mean.view().insert_axis(Axis(0));
        let y_centered = y - &y_mean.view().insert_axis(Axis(0));

        let coefficients = solve_normal_equations(&x_centered, &y_centered, alpha)?;
        let intercept = &y_mean - &x_mean.dot(&coefficients);

        Ok(Self {
            coefficients,
            intercept,
        })
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_features(self.coefficients.nrows(), x)?;
        Ok(x.dot(&self.coefficients) + &self.intercept.view().insert_axis(Axis(0)))
    }
}

/// Ordinary least squares, one output column per target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    name: String,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl LinearRegression {
    /// Create a new linear regression model
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fit_intercept: true,
            fitted: None,
        }
    }

    /// Enable/disable fitting intercept
    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Fitted coefficients, `n_features x n_targets`
    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }

    pub fn intercept(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.intercept)
    }
}

impl Regressor for LinearRegression {
    fn name(&self) -> &str {
        &self.name
    }

    fn enrol_window(&self) -> usize {
        0
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        self.fitted = Some(LinearFit::solve(x, y, 0.0, self.fit_intercept)?);
        info!(model = %self.name, rows = x.nrows(), targets = y.ncols(), "Linear model fitted");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted
            .as_ref()
            .ok_or(PipelineError::ModelNotFitted)?
            .predict(x)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

/// Ridge Regression (L2-regularized linear regression)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    name: String,
    /// L2 regularization strength
    pub alpha: f64,
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl RidgeRegression {
    pub fn new(name: impl Into<String>, alpha: f64) -> Self {
        Self {
            name: name.into(),
            alpha,
            fit_intercept: true,
            fitted: None,
        }
    }

    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }
}

impl Regressor for RidgeRegression {
    fn name(&self) -> &str {
        &self.name
    }

    fn enrol_window(&self) -> usize {
        0
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(PipelineError::InvalidParameter {
                name: "alpha".to_string(),
                value: self.alpha.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        self.fitted = Some(LinearFit::solve(x, y, self.alpha, self.fit_intercept)?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted
            .as_ref()
            .ok_or(PipelineError::ModelNotFitted)?
            .predict(x)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

/// Default candidate strengths for [`RidgeCV`]
pub const DEFAULT_RIDGE_ALPHAS: [f64; 3] = [0.1, 1.0, 10.0];

/// Ridge regression whose alpha is picked by time-ordered cross-validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeCV {
    name: String,
    alphas: Vec<f64>,
    n_splits: usize,
    validation_fraction: f64,
    best_alpha: Option<f64>,
    fitted: Option<LinearFit>,
}

impl RidgeCV {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alphas: DEFAULT_RIDGE_ALPHAS.to_vec(),
            n_splits: 3,
            validation_fraction: 0.2,
            best_alpha: None,
            fitted: None,
        }
    }

    /// Ridge model whose validation fraction is `options.test_size`
    pub fn from_options(name: impl Into<String>, options: &ModelOptions) -> Self {
        Self::new(name).with_validation_fraction(options.test_size)
    }

    pub fn with_alphas(mut self, alphas: Vec<f64>) -> Self {
        self.alphas = alphas;
        self
    }

    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = n_splits.max(1);
        self
    }

    /// Fraction of rows used for validation, spread over all folds
    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = fraction;
        self
    }

    pub fn validation_fraction(&self) -> f64 {
        self.validation_fraction
    }

    /// Alpha selected by the last fit
    pub fn best_alpha(&self) -> Option<f64> {
        self.best_alpha
    }

    /// Forward-chaining folds used for alpha selection on `n_rows` rows
    pub fn folds(&self, n_rows: usize) -> Vec<TimeSeriesFold> {
        TimeSeriesCV::new(self.n_splits)
            .with_validation_fraction(self.validation_fraction)
            .split(n_rows)
    }

    fn select_alpha(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<f64> {
        let folds = self.folds(x.nrows());

        let fallback = self.alphas[self.alphas.len() / 2];
        if folds.is_empty() {
            warn!(
                model = %self.name,
                rows = x.nrows(),
                alpha = fallback,
                "Too few rows for cross-validation"
            );
            return Ok(fallback);
        }

        let mut best = (fallback, f64::INFINITY);
        for &alpha in &self.alphas {
            let mut total = 0.0;
            for fold in &folds {
                let x_tr = x.slice(s![fold.train.clone(), ..]).to_owned();
                let y_tr = y.slice(s![fold.train.clone(), ..]).to_owned();
                let x_val = x.slice(s![fold.validation.clone(), ..]).to_owned();
                let y_val = y.slice(s![fold.validation.clone(), ..]);

                let pred = LinearFit::solve(&x_tr, &y_tr, alpha, true)?.predict(&x_val)?;
                total += (&pred - &y_val).mapv(|e| e * e).mean().unwrap_or(f64::INFINITY);
            }
            let score = total / folds.len() as f64;
            debug!(model = %self.name, alpha, mse = score, "Ridge alpha candidate");
            if score < best.1 {
                best = (alpha, score);
            }
        }
        Ok(best.0)
    }
}

impl Regressor for RidgeCV {
    fn name(&self) -> &str {
        &self.name
    }

    fn enrol_window(&self) -> usize {
        0
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_rows(x, y)?;
        if self.alphas.is_empty() || self.alphas.iter().any(|a| a.is_nan() || *a < 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "alphas".to_string(),
                value: format!("{:?}", self.alphas),
                reason: "must be a non-empty list of non-negative values".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(PipelineError::InvalidParameter {
                name: "test_size".to_string(),
                value: self.validation_fraction.to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }

        let alpha = self.select_alpha(x, y)?;
        self.fitted = Some(LinearFit::solve(x, y, alpha, true)?);
        self.best_alpha = Some(alpha);
        info!(model = %self.name, alpha, rows = x.nrows(), "Ridge model fitted");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fitted
            .as_ref()
            .ok_or(PipelineError::ModelNotFitted)?
            .predict(x)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_simple() {
        let x = array![
            [1.0, 1.0],
            [2.0, 1.0],
            [1.0, 2.0],
            [2.0, 2.0],
            [3.0, 1.0],
        ];
        // y = 2*x1 + 3*x2 + 1
        let y = array![[6.0], [8.0], [9.0], [11.0], [10.0]];

        let mut model = LinearRegression::new("linear");
        model.fit(&x, &y).unwrap();

        assert!(model.is_fitted());
        let coef = model.coefficients().unwrap();
        assert!((coef[[0, 0]] - 2.0).abs() < 1e-8);
        assert!((coef[[1, 0]] - 3.0).abs() < 1e-8);
        assert!((model.intercept().unwrap()[0] - 1.0).abs() < 1e-8);

        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.99, "R² should be close to 1, got {}", r2);
    }

    #[test]
    fn test_multi_output() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![[1.0, 0.0], [3.0, -1.0], [5.0, -2.0], [7.0, -3.0]];

        let mut model = LinearRegression::new("multi");
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[4.0]]).unwrap();

        assert!((pred[[0, 0]] - 9.0).abs() < 1e-8);
        assert!((pred[[0, 1]] + 4.0).abs() < 1e-8);
    }

    #[test]
    fn test_collinear_features_still_solve() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let y = array![[2.0], [4.0], [6.0]];

        let mut model = LinearRegression::new("collinear");
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.dim(), (3, 1));
    }

    #[test]
    fn test_not_fitted() {
        let model = LinearRegression::new("unfitted");
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(PipelineError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_ridge_shrinks() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![[2.0], [4.0], [6.0], [8.0]];

        let mut weak = RidgeRegression::new("weak", 0.0);
        let mut strong = RidgeRegression::new("strong", 100.0);
        weak.fit(&x, &y).unwrap();
        strong.fit(&x, &y).unwrap();

        let w_weak = weak.coefficients().unwrap()[[0, 0]];
        let w_strong = strong.coefficients().unwrap()[[0, 0]];
        assert!((w_weak - 2.0).abs() < 1e-8);
        assert!(w_strong < w_weak);
    }

    #[test]
    fn test_ridge_cv_selects_from_candidates() {
        let n = 60;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| ((i * (j + 3)) % 7) as f64 + i as f64 * 0.1);
        let y = Array2::from_shape_fn((n, 1), |(i, _)| x[[i, 0]] * 1.5 - x[[i, 1]] * 0.5 + 2.0);

        let mut model = RidgeCV::new("ridge");
        model.fit(&x, &y).unwrap();

        let alpha = model.best_alpha().unwrap();
        assert!(DEFAULT_RIDGE_ALPHAS.contains(&alpha));
        assert!(model.score(&x, &y).unwrap() > 0.95);
    }

    #[test]
    fn test_ridge_cv_few_rows_falls_back() {
        let x = array![[1.0], [2.0]];
        let y = array![[1.0], [2.0]];
        let mut model = RidgeCV::new("tiny").with_n_splits(3);
        model.fit(&x, &y).unwrap();
        assert!(model.best_alpha().is_some());
    }

    #[test]
    fn test_ridge_cv_folds_follow_test_size() {
        let narrow = RidgeCV::from_options("narrow", &ModelOptions::mlp().with_test_size(0.3));
        let wide = RidgeCV::from_options("wide", &ModelOptions::mlp().with_test_size(0.6));
        assert_eq!(narrow.validation_fraction(), 0.3);

        let narrow_folds = narrow.folds(60);
        let wide_folds = wide.folds(60);
        assert_eq!(narrow_folds.len(), 3);
        assert_eq!(narrow_folds[0].train, 0..42);
        assert_eq!(narrow_folds[2].validation, 54..60);
        assert_eq!(wide_folds[0].train, 0..24);
        assert_eq!(wide_folds[2].validation, 48..60);
    }

    #[test]
    fn test_ridge_cv_rejects_invalid_test_size() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![[1.0], [2.0], [3.0]];
        let mut model = RidgeCV::new("bad").with_validation_fraction(1.5);
        assert!(matches!(
            model.fit(&x, &y),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }
}
