//! Regression models
//!
//! [`Estimator`] fits a [`Regressor`] from a row-major feature matrix. The
//! concrete implementation is a gradient-boosted tree ensemble.

pub mod gbdt;
pub mod tree;

use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};

pub use gbdt::{GradientBoostedModel, GradientBoostedRegressor};

/// Booster hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows drawn (without replacement) for each tree
    pub subsample: f64,
    /// Fraction of feature columns drawn for each tree
    pub colsample_bytree: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Minimum hessian sum on each side of a split
    pub min_child_weight: f64,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 150,
            max_depth: 5,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            seed: 42,
        }
    }
}

/// Fitted model mapping a feature row to a scalar
pub trait Regressor {
    /// Number of input columns the model was fitted on
    fn n_features(&self) -> usize;

    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let expected = self.n_features();
        if let Some(row) = x.iter().find(|row| row.len() != expected) {
            return Err(PredictorError::FeatureMismatch {
                expected,
                actual: row.len(),
            });
        }
        Ok(x.iter().map(|row| self.predict_row(row)).collect())
    }

    /// Relative importance per input column, summing to 1 (all zero for a split-less model)
    fn feature_importances(&self) -> &[f64];
}

/// Learner producing a [`Regressor`]
pub trait Estimator {
    type Model: Regressor;

    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Self::Model>;
}

/// Mean absolute error; `None` for empty or mismatched inputs
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Some(total / actual.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mae() {
        assert_eq!(mean_absolute_error(&[1.0, 2.0, 3.0], &[1.5, 2.0, 2.0]), Some(0.5));
        assert_eq!(mean_absolute_error(&[], &[]), None);
        assert_eq!(mean_absolute_error(&[1.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn test_params_from_partial_toml() {
        let params: BoosterParams = toml::from_str("n_estimators = 10\nseed = 7").unwrap();
        assert_eq!(params.n_estimators, 10);
        assert_eq!(params.seed, 7);
        assert_eq!(params.max_depth, 5);
        assert_eq!(params.learning_rate, 0.05);
    }
}
