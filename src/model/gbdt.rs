//! Gradient-boosted regression trees
//!
//! Squared-error boosting: start from the mean target, then repeatedly fit a
//! tree to the residual gradients of a seeded row/column subsample and add
//! its output scaled by the learning rate.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PredictorError, Result};
use crate::model::tree::{CartBuilder, Tree, TreeConfig};
use crate::model::{BoosterParams, Estimator, Regressor};

/// Fitted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedModel {
    pub base_score: f64,
    pub learning_rate: f64,
    pub n_features: usize,
    pub trees: Vec<Tree>,
    pub importances: Vec<f64>,
}

impl Regressor for GradientBoostedModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + self.learning_rate * tree.predict(row))
    }

    fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}

/// Boosting learner
#[derive(Debug, Clone, Default)]
pub struct GradientBoostedRegressor {
    params: BoosterParams,
}

impl GradientBoostedRegressor {
    pub fn new(params: BoosterParams) -> Self {
        Self { params }
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.params.max_depth,
            reg_lambda: self.params.reg_lambda,
            min_child_weight: self.params.min_child_weight,
        }
    }
}

/// Number of items kept when drawing `fraction` of `total`; at least one
fn sample_size(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction.clamp(0.0, 1.0)).round() as usize).clamp(1, total.max(1))
}

/// Sorted subset of `0..total`
fn draw(rng: &mut StdRng, total: usize, fraction: f64) -> Vec<usize> {
    let k = sample_size(total, fraction);
    if k >= total {
        return (0..total).collect();
    }
    let mut picked = sample(rng, total, k).into_vec();
    picked.sort_unstable();
    picked
}

impl Estimator for GradientBoostedRegressor {
    type Model = GradientBoostedModel;

    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<GradientBoostedModel> {
        if x.is_empty() {
            return Err(PredictorError::InsufficientData(
                "no training rows".to_string(),
            ));
        }
        if x.len() != y.len() {
            return Err(PredictorError::InsufficientData(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if let Some(row) = x.iter().find(|row| row.len() != n_features) {
            return Err(PredictorError::FeatureMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }

        let n_samples = x.len();
        let base_score = y.iter().sum::<f64>() / n_samples as f64;
        let mut predictions = vec![base_score; n_samples];
        let hessians = vec![1.0; n_samples];
        let mut gains = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        for tree_idx in 0..self.params.n_estimators {
            let gradients: Vec<f64> = predictions.iter().zip(y).map(|(p, t)| p - t).collect();
            let rows = draw(&mut rng, n_samples, self.params.subsample);
            let columns = if n_features == 0 {
                Vec::new()
            } else {
                draw(&mut rng, n_features, self.params.colsample_bytree)
            };

            let tree = CartBuilder::new(x, &gradients, &hessians, &columns, self.tree_config())
                .build(&rows, &mut gains);

            for (pred, row) in predictions.iter_mut().zip(x) {
                *pred += self.params.learning_rate * tree.predict(row);
            }

            if (tree_idx + 1) % 50 == 0 {
                debug!("Trained tree {}/{}", tree_idx + 1, self.params.n_estimators);
            }
            trees.push(tree);
        }

        let total_gain: f64 = gains.iter().sum();
        let importances = if total_gain > 0.0 {
            gains.iter().map(|g| g / total_gain).collect()
        } else {
            vec![0.0; n_features]
        };

        Ok(GradientBoostedModel {
            base_score,
            learning_rate: self.params.learning_rate,
            n_features,
            trees,
            importances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y = x.iter().map(|row| 80.0 + 0.5 * row[0]).collect();
        (x, y)
    }

    #[test]
    fn test_fit_reduces_error() {
        let (x, y) = linear_data(60);
        let model = GradientBoostedRegressor::default().fit(&x, &y).unwrap();

        let mean = y.iter().sum::<f64>() / y.len() as f64;
        let baseline: f64 = y.iter().map(|t| (t - mean).abs()).sum::<f64>() / y.len() as f64;
        let predictions = model.predict(&x).unwrap();
        let fitted: f64 = predictions
            .iter()
            .zip(&y)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / y.len() as f64;

        assert!(fitted < baseline / 2.0, "fitted {} baseline {}", fitted, baseline);
        assert_eq!(model.trees.len(), 150);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = linear_data(40);
        let a = GradientBoostedRegressor::default().fit(&x, &y).unwrap();
        let b = GradientBoostedRegressor::default().fit(&x, &y).unwrap();
        assert_eq!(a, b);

        let other = GradientBoostedRegressor::new(BoosterParams {
            seed: 7,
            ..Default::default()
        })
        .fit(&x, &y)
        .unwrap();
        assert_ne!(a.trees, other.trees);
    }

    #[test]
    fn test_importances_favor_signal() {
        let (x, y) = linear_data(60);
        let model = GradientBoostedRegressor::default().fit(&x, &y).unwrap();
        let importances = model.feature_importances();

        assert_eq!(importances.len(), 2);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_constant_target() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![90.0; 3];
        let model = GradientBoostedRegressor::default().fit(&x, &y).unwrap();

        assert_eq!(model.predict_row(&[2.5]), 90.0);
        assert_eq!(model.feature_importances(), &[0.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let reg = GradientBoostedRegressor::default();
        assert!(matches!(
            reg.fit(&[], &[]),
            Err(PredictorError::InsufficientData(_))
        ));
        assert!(matches!(
            reg.fit(&[vec![1.0, 2.0], vec![1.0]], &[1.0, 2.0]),
            Err(PredictorError::FeatureMismatch { .. })
        ));

        let model = reg.fit(&[vec![1.0], vec![2.0]], &[1.0, 2.0]).unwrap();
        assert!(matches!(
            model.predict(&[vec![1.0, 2.0]]),
            Err(PredictorError::FeatureMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_model_json() {
        let (x, y) = linear_data(20);
        let model = GradientBoostedRegressor::new(BoosterParams {
            n_estimators: 5,
            ..Default::default()
        })
        .fit(&x, &y)
        .unwrap();

        let text = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedModel = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.trees.len(), 5);
        assert!((restored.predict_row(&x[3]) - model.predict_row(&x[3])).abs() < 1e-9);
    }
}
