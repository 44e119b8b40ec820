//! Enrolment-window alignment
//!
//! A model with enrolment window `W` consumes rows `[i - W, i]` to predict
//! row `i`, so it produces no prediction for the first `W` rows of a subset.
//! When several models are compared, every prediction is aligned to the
//! largest window and to the matching tail of the test index.

use crate::error::{PipelineError, Result};
use chrono::NaiveDateTime;
use ndarray::{s, Array2, Array3};

/// Largest enrolment window, zero when there are no models
pub fn max_enrol_window<I: IntoIterator<Item = usize>>(windows: I) -> usize {
    windows.into_iter().max().unwrap_or(0)
}

/// Timestamps of the test rows that receive an aligned prediction.
///
/// Equals `test_index[max_window..]`; a window that leaves no rows is an
/// alignment error.
pub fn index_column(test_index: &[NaiveDateTime], max_window: usize) -> Result<Vec<NaiveDateTime>> {
    if max_window >= test_index.len() {
        return Err(PipelineError::AlignmentError {
            window: max_window,
            rows: test_index.len(),
        });
    }
    Ok(test_index[max_window..].to_vec())
}

/// Stack lagged windows of `x`.
///
/// Output shape is `(n - window, window + 1, n_features)`; sample `k` holds
/// rows `k ..= k + window`, oldest first.
pub fn lagged_windows(x: &Array2<f64>, window: usize) -> Result<Array3<f64>> {
    let n = x.nrows();
    if window >= n {
        return Err(PipelineError::AlignmentError { window, rows: n });
    }

    let n_samples = n - window;
    let steps = window + 1;
    Ok(Array3::from_shape_fn((n_samples, steps, x.ncols()), |(k, t, f)| {
        x[[k + t, f]]
    }))
}

/// Rows of a target matrix that line up with windowed predictions
pub fn aligned_targets(y: &Array2<f64>, window: usize) -> Result<Array2<f64>> {
    if window >= y.nrows() {
        return Err(PipelineError::AlignmentError {
            window,
            rows: y.nrows(),
        });
    }
    Ok(y.slice(s![window.., ..]).to_owned())
}

/// Keep the last `rows` rows of a prediction matrix
pub fn align_tail(predictions: &Array2<f64>, rows: usize) -> Result<Array2<f64>> {
    let n = predictions.nrows();
    if rows > n {
        return Err(PipelineError::ShapeError {
            expected: format!("at least {rows} prediction rows"),
            actual: format!("{n} rows"),
        });
    }
    Ok(predictions.slice(s![n - rows.., ..]).to_owned())
}
