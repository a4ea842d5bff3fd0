//! Random forest ("DRF") trainer.
//!
//! Each tree is grown on a row sample drawn without replacement, considering
//! a random subset of features at every node. Leaves hold the weighted mean
//! of the target. Binomial responses grow one tree per round on the 0/1
//! response; multinomial responses grow one tree per class on class
//! indicators.

use rand::SeedableRng;
use rand::seq::index::sample;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::grower::{GainParams, TreeGrower};
use super::{TrainerError, TrainingData, TreeTrainer, output_target, tree_seed};
use crate::repr::TreeSet;
use crate::training::Family;
use crate::utils::CancellationToken;

/// Random forest trainer.
#[derive(Debug, Clone)]
pub struct RandomForestTrainer {
    pub seed: u64,
    /// Fraction of rows sampled (without replacement) per tree. Default: 0.632.
    pub sample_rate: f64,
    /// Features tried per node. `None` uses `sqrt(p)` for classification and
    /// `p / 3` for regression.
    pub mtries: Option<usize>,
    pub gain: GainParams,
}

impl RandomForestTrainer {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            sample_rate: 0.632,
            mtries: None,
            gain: GainParams {
                reg_lambda: 0.0,
                min_gain: 0.0,
                min_child_weight: 1e-6,
                min_samples_leaf: 1,
            },
        }
    }

    fn resolve_mtries(&self, n_features: usize, family: Family) -> usize {
        let default = if family.is_classification() {
            (n_features as f64).sqrt() as usize
        } else {
            n_features / 3
        };
        self.mtries.unwrap_or(default).clamp(1, n_features.max(1))
    }
}

impl TreeTrainer for RandomForestTrainer {
    fn name(&self) -> &'static str {
        "drf"
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

        // Squared loss from zero: leaf weight -G/H is the weighted target mean.
        let targets: Vec<(Vec<f64>, Vec<f64>)> = (0..n_outputs)
            .map(|k| {
                let grad = data
                    .response
                    .iter()
                    .zip(data.weights)
                    .map(|(&y, &w)| -output_target(family, y, k) * w)
                    .collect();
                (grad, data.weights.to_vec())
            })
            .collect();

        let grower = TreeGrower {
            features: data.features.reborrow(),
            schema: data.schema,
            params: &self.gain,
            max_depth: depth,
            mtries: Some(self.resolve_mtries(data.n_features(), family)),
            shrinkage: 1.0,
        };

        let jobs: Vec<usize> = (0..n_trees as usize * n_outputs).collect();
        let trees = data.parallelism.maybe_par_map(jobs, |job| {
            if cancel.is_cancelled() {
                return Err(TrainerError::Cancelled);
            }
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(tree_seed(self.seed, depth, job));
            let mut rows: Vec<u32> = sample(&mut rng, n_rows, n_sampled)
                .into_iter()
                .map(|r| r as u32)
                .collect();
            rows.sort_unstable();
            let (grad, hess) = &targets[job % n_outputs];
            Ok(grower.grow(rows, grad, hess, &mut rng))
        });

        let mut set = TreeSet::new(depth);
        for (job, tree) in trees.into_iter().enumerate() {
            set.push_tree(tree?, (job % n_outputs) as u32);
        }
        Ok(set)
    }
}
