//! Time-ordered cross-validation folds

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One forward-chaining fold: training rows strictly precede validation rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesFold {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub fold: usize,
}

/// Forward-chaining cross-validator over row positions
#[derive(Debug, Clone)]
pub struct TimeSeriesCV {
    /// Number of folds
    n_splits: usize,
    /// Minimum training size
    min_train_size: usize,
    /// Gap between train and validation
    gap: usize,
    /// Validation fraction of the rows, per fold
    validation_fraction: f64,
}

impl TimeSeriesCV {
    /// Create new time series CV
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits: n_splits.max(1),
            min_train_size: 1,
            gap: 0,
            validation_fraction: 0.2,
        }
    }

    /// Set minimum training size
    pub fn with_min_train_size(mut self, size: usize) -> Self {
        self.min_train_size = size.max(1);
        self
    }

    /// Set gap between train and validation
    pub fn with_gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    /// Set validation fraction, split evenly across folds
    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Generate folds, oldest first.
    ///
    /// Folds whose training part would be shorter than the minimum are skipped.
    pub fn split(&self, n_samples: usize) -> Vec<TimeSeriesFold> {
        let mut folds = Vec::new();

        let total_validation = (n_samples as f64 * self.validation_fraction).round() as usize;
        let fold_size = (total_validation / self.n_splits).max(1);

        for fold in 0..self.n_splits {
            let Some(val_end) = n_samples.checked_sub(fold * fold_size) else {
                break;
            };
            let Some(val_start) = val_end.checked_sub(fold_size) else {
                break;
            };
            let Some(train_end) = val_start.checked_sub(self.gap) else {
                break;
            };

            if train_end < self.min_train_size {
                break;
            }

            folds.push(TimeSeriesFold {
                train: 0..train_end,
                validation: val_start..val_end,
                fold: 0,
            });
        }

        folds.reverse();
        for (i, fold) in folds.iter_mut().enumerate() {
            fold.fold = i;
        }
        folds
    }
}
