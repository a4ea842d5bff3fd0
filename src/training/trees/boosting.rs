//! Gradient boosting ("GBM") trainer.
//!
//! Trees are fitted to second-order statistics of the family's loss at the
//! current prediction, one tree per output per round, starting from the null
//! intercepts.

use rand::SeedableRng;
use rand::seq::index::sample;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::grower::{GainParams, TreeGrower, predict_row_view};
use super::{TrainerError, TrainingData, TreeTrainer, tree_seed};
use crate::repr::TreeSet;
use crate::training::Family;
use crate::utils::CancellationToken;

/// Gradient boosting trainer.
#[derive(Debug, Clone)]
pub struct GradientBoostingTrainer {
    pub seed: u64,
    /// Shrinkage applied to every leaf. Default: 0.1.
    pub learning_rate: f64,
    /// Fraction of rows sampled per round. Default: 1.0.
    pub sample_rate: f64,
    pub gain: GainParams,
}

impl GradientBoostingTrainer {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            learning_rate: 0.1,
            sample_rate: 1.0,
            gain: GainParams::default(),
        }
    }
}

impl TreeTrainer for GradientBoostingTrainer {
    fn name(&self) -> &'static str {
        "gbm"
    }

    fn train(
        &self,
        data: &TrainingData<'_>,
        depth: u32,
        n_trees: u32,
        family: Family,
        cancel: &CancellationToken,
    ) -> Result<TreeSet, TrainerError> {
        data.validate()?;
        let n_rows = data.n_rows();
        let n_outputs = family.n_outputs();
        let n_sampled = ((n_rows as f64 * self.sample_rate).round() as usize).clamp(1, n_rows);

        let intercepts = family.null_intercepts(data.response, data.weights);
        // Row-major predictions, n_outputs per row.
        let mut eta: Vec<f64> = (0..n_rows).flat_map(|_| intercepts.iter().copied()).collect();
        let mut pairs = vec![(0.0, 0.0); n_outputs];
        let mut grad = vec![vec![0.0; n_rows]; n_outputs];
        let mut hess = vec![vec![0.0; n_rows]; n_outputs];

        let grower = TreeGrower {
            features: data.features.reborrow(),
            schema: data.schema,
            params: &self.gain,
            max_depth: depth,
            mtries: None,
            shrinkage: self.learning_rate,
        };

        let mut set = TreeSet::new(depth);
        for round in 0..n_trees as usize {
            if cancel.is_cancelled() {
                return Err(TrainerError::Cancelled);
            }

            for i in 0..n_rows {
                family.gradient_hessian(
                    &eta[i * n_outputs..(i + 1) * n_outputs],
                    data.response[i],
                    &mut pairs,
                );
                let w = data.weights[i];
                for (k, &(g, h)) in pairs.iter().enumerate() {
                    grad[k][i] = g * w;
                    hess[k][i] = h * w;
                }
            }

            let mut rng = Xoshiro256PlusPlus::seed_from_u64(tree_seed(self.seed, depth, round));
            let rows: Vec<u32> = if n_sampled < n_rows {
                let mut rows: Vec<u32> = sample(&mut rng, n_rows, n_sampled)
                    .into_iter()
                    .map(|r| r as u32)
                    .collect();
                rows.sort_unstable();
                rows
            } else {
                (0..n_rows as u32).collect()
            };

            let trees = data.parallelism.maybe_par_map(0..n_outputs, |k| {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(tree_seed(self.seed, depth, round * n_outputs + k));
                grower.grow(rows.clone(), &grad[k], &hess[k], &mut rng)
            });

            for (k, tree) in trees.into_iter().enumerate() {
                for (i, row) in data.features.rows().into_iter().enumerate() {
                    eta[i * n_outputs + k] += predict_row_view(&tree, row) as f64;
                }
                set.push_tree(tree, k as u32);
            }
        }

        log::trace!(
            "gbm depth {}: training deviance {:.6}",
            depth,
            family.deviance(&eta, data.response, data.weights)
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureMeta, FrameSchema};
    use crate::utils::Parallelism;
    use ndarray::Array2;

    #[test]
    fn boosting_reduces_deviance() {
        let x = Array2::from_shape_fn((60, 1), |(i, _)| i as f32);
        let schema = FrameSchema::from_features(vec![FeatureMeta::numeric("x")]);
        let y: Vec<f64> = (0..60).map(|i| f64::from(i >= 30)).collect();
        let w = vec![1.0; 60];
        let data = TrainingData {
            features: x.view(),
            schema: &schema,
            response: &y,
            weights: &w,
            parallelism: Parallelism::Sequential,
        };
        let set = GradientBoostingTrainer::new(0)
            .train(&data, 2, 10, Family::Binomial, &CancellationToken::new())
            .unwrap();
        assert_eq!(set.n_trees(), 10);

        let intercept = Family::Binomial.null_intercepts(&y, &w)[0];
        let eta: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| intercept + set.trees().iter().map(|t| predict_row_view(t, row) as f64).sum::<f64>())
            .collect();
        let null_eta = vec![intercept; 60];
        assert!(
            Family::Binomial.deviance(&eta, &y, &w) < Family::Binomial.deviance(&null_eta, &y, &w)
        );
    }

    #[test]
    fn multinomial_rounds_grow_one_tree_per_class() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f32);
        let schema = FrameSchema::from_features(vec![FeatureMeta::numeric("x")]);
        let y: Vec<f64> = (0..30).map(|i| (i / 10) as f64).collect();
        let w = vec![1.0; 30];
        let data = TrainingData {
            features: x.view(),
            schema: &schema,
            response: &y,
            weights: &w,
            parallelism: Parallelism::Parallel,
        };
        let set = GradientBoostingTrainer::new(0)
            .train(&data, 1, 3, Family::Multinomial { n_classes: 3 }, &CancellationToken::new())
            .unwrap();
        assert_eq!(set.n_trees(), 9);
        assert_eq!(set.tree_groups()[..3], [0, 1, 2]);
    }
}
