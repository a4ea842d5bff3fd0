//! Tree-ensemble trainers that feed rule extraction.
//!
//! A [`TreeTrainer`] grows `n_trees` trees (per class for multinomial
//! responses) limited to a given depth and hands them over as a [`TreeSet`].
//! Rule extraction only reads tree structure, so any trainer producing
//! valid trees can be plugged in.

mod boosting;
mod forest;
mod grower;

pub use boosting::GradientBoostingTrainer;
pub use forest::RandomForestTrainer;
pub use grower::GainParams;

use ndarray::ArrayView2;

use crate::data::FrameSchema;
use crate::repr::TreeSet;
use crate::training::Family;
use crate::utils::{CancellationToken, Parallelism};

/// Errors raised by a tree trainer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainerError {
    #[error("cancelled")]
    Cancelled,
    #[error("training data has no rows")]
    EmptyData,
    #[error("{what} has {found} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Training inputs shared by all tree sets of one run.
#[derive(Debug, Clone)]
pub struct TrainingData<'a> {
    /// Row-major feature matrix laid out by `schema`. `NaN` is missing.
    pub features: ArrayView2<'a, f32>,
    pub schema: &'a FrameSchema,
    /// Encoded response, no missing values.
    pub response: &'a [f64],
    pub weights: &'a [f64],
    pub parallelism: Parallelism,
}

impl TrainingData<'_> {
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub(crate) fn validate(&self) -> Result<(), TrainerError> {
        let n = self.n_rows();
        if n == 0 {
            return Err(TrainerError::EmptyData);
        }
        for (what, found) in [("response", self.response.len()), ("weights", self.weights.len())] {
            if found != n {
                return Err(TrainerError::LengthMismatch { what, expected: n, found });
            }
        }
        if self.schema.n_features() != self.n_features() {
            return Err(TrainerError::LengthMismatch {
                what: "schema",
                expected: self.n_features(),
                found: self.schema.n_features(),
            });
        }
        Ok(())
    }
}

/// Grows depth-limited trees for rule generation.
pub trait TreeTrainer: Send + Sync {
    /// Short algorithm name used in logs.
    fn name(&self) -> &'static str;

    /// Grow `n_trees` trees of maximum depth `depth`.
    ///
    /// Implementations poll `cancel` between trees and return
    /// [`TrainerError::Cancelled`] once it is set.
    fn train(
        &self,
        data: &TrainingData<'_>,
        depth: u32,
        n_trees: u32,
        family: Family,
        cancel: &CancellationToken,
    ) -> Result<TreeSet, TrainerError>;
}

/// Per-tree seed derived from the trainer seed, the depth and the tree index.
pub(crate) fn tree_seed(seed: u64, depth: u32, index: usize) -> u64 {
    seed ^ (depth as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_add(1).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

/// Per-output fitting target: the response, or class indicators.
pub(crate) fn output_target(family: Family, y: f64, k: usize) -> f64 {
    match family {
        Family::Regression | Family::Binomial => y,
        Family::Multinomial { .. } => f64::from(y as usize == k),
    }
}
