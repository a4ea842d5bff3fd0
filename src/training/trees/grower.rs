//! Exact greedy, depth-limited tree growing.
//!
//! Splits are scored with second-order statistics: each row carries a
//! gradient and a hessian, and a split's gain is
//! ```text
//! gain = 0.5 * [G_L²/(H_L + λ) + G_R²/(H_R + λ) - G_P²/(H_P + λ)] - γ
//! ```
//! Numeric candidates are midpoints between consecutive distinct values.
//! Categorical candidates order the present levels by leaf weight and try
//! every prefix on the left. Missing values are tried on both sides.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use rand::seq::index::sample;

use crate::data::{FeatureType, FrameSchema};
use crate::repr::{MutableTree, NodeId, Tree, TreeView, float_to_category};

// =============================================================================
// Gain Parameters
// =============================================================================

/// Parameters for split gain computation and leaf weight calculation.
#[derive(Clone, Debug, PartialEq)]
pub struct GainParams {
    /// L2 regularization (lambda).
    pub reg_lambda: f64,
    /// Minimum split gain (gamma).
    pub min_gain: f64,
    /// Minimum sum of hessians per child.
    pub min_child_weight: f64,
    /// Minimum samples per child.
    pub min_samples_leaf: u32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            reg_lambda: 1.0,
            min_gain: 0.0,
            min_child_weight: 1.0,
            min_samples_leaf: 1,
        }
    }
}

impl GainParams {
    #[inline]
    pub fn compute_gain(&self, left: Stats, right: Stats, parent: Stats) -> f64 {
        let score = |s: Stats| s.grad * s.grad / (s.hess + self.reg_lambda);
        0.5 * (score(left) + score(right) - score(parent)) - self.min_gain
    }

    #[inline]
    pub fn is_valid_split(&self, left: Stats, right: Stats) -> bool {
        left.hess >= self.min_child_weight
            && right.hess >= self.min_child_weight
            && left.count >= self.min_samples_leaf
            && right.count >= self.min_samples_leaf
    }

    /// Newton step `-G / (H + λ)`.
    #[inline]
    pub fn compute_leaf_weight(&self, stats: Stats) -> f64 {
        let denom = stats.hess + self.reg_lambda;
        if denom > 0.0 { -stats.grad / denom } else { 0.0 }
    }
}

/// Gradient statistics of a row subset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stats {
    pub grad: f64,
    pub hess: f64,
    pub count: u32,
}

impl Stats {
    #[inline]
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    #[inline]
    fn plus(self, other: Stats) -> Stats {
        Stats {
            grad: self.grad + other.grad,
            hess: self.hess + other.hess,
            count: self.count + other.count,
        }
    }

    #[inline]
    fn minus(self, other: Stats) -> Stats {
        Stats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

// =============================================================================
// Split search
// =============================================================================

#[derive(Clone, Debug)]
enum SplitRule {
    Numeric { threshold: f32 },
    Categorical { right: Vec<u32> },
}

#[derive(Clone, Debug)]
struct SplitCandidate {
    feature: u32,
    rule: SplitRule,
    default_left: bool,
    gain: f64,
}

impl SplitCandidate {
    fn goes_left(&self, value: f32) -> bool {
        match &self.rule {
            _ if value.is_nan() => self.default_left,
            SplitRule::Numeric { threshold } => value < *threshold,
            SplitRule::Categorical { .. } if value < 0.0 => self.default_left,
            SplitRule::Categorical { right } => right.binary_search(&float_to_category(value)).is_err(),
        }
    }
}

/// Grows one tree over a row subset.
pub(crate) struct TreeGrower<'a> {
    pub features: ArrayView2<'a, f32>,
    pub schema: &'a FrameSchema,
    pub params: &'a GainParams,
    pub max_depth: u32,
    /// Features sampled per node; `None` considers all.
    pub mtries: Option<usize>,
    /// Multiplier applied to leaf weights.
    pub shrinkage: f64,
}

impl TreeGrower<'_> {
    pub fn grow<R: Rng>(&self, rows: Vec<u32>, grad: &[f64], hess: &[f64], rng: &mut R) -> Tree {
        let mut tree = MutableTree::new();
        let root = tree.init_root();
        let mut stack: Vec<(NodeId, Vec<u32>, u32)> = vec![(root, rows, 0)];

        while let Some((node, rows, depth)) = stack.pop() {
            let mut parent = Stats::default();
            rows.iter()
                .for_each(|&r| parent.add(grad[r as usize], hess[r as usize]));

            let split = if depth < self.max_depth && rows.len() >= 2 {
                self.best_split(&rows, grad, hess, parent, rng)
            } else {
                None
            };

            let Some(split) = split else {
                let value = self.params.compute_leaf_weight(parent) * self.shrinkage;
                tree.make_leaf(node, value as f32);
                continue;
            };

            let (left, right) = match &split.rule {
                SplitRule::Numeric { threshold } => {
                    tree.apply_numeric_split(node, split.feature, *threshold, split.default_left)
                }
                SplitRule::Categorical { right } => {
                    tree.apply_categorical_split(node, split.feature, right.clone(), split.default_left)
                }
            };
            let column = self.features.column(split.feature as usize);
            let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = rows
                .into_iter()
                .partition(|&r| split.goes_left(column[r as usize]));
            stack.push((right, right_rows, depth + 1));
            stack.push((left, left_rows, depth + 1));
        }

        tree.freeze()
    }

    fn best_split<R: Rng>(
        &self,
        rows: &[u32],
        grad: &[f64],
        hess: &[f64],
        parent: Stats,
        rng: &mut R,
    ) -> Option<SplitCandidate> {
        let n_features = self.features.ncols();
        let mut candidates: Vec<usize> = match self.mtries {
            Some(m) if m < n_features => sample(rng, n_features, m).into_vec(),
            _ => (0..n_features).collect(),
        };
        candidates.sort_unstable();

        let mut best: Option<SplitCandidate> = None;
        for f in candidates {
            let column = self.features.column(f);
            let found = match self.schema.get(f).map(|m| &m.feature_type) {
                Some(FeatureType::Categorical { levels }) => {
                    self.categorical_split(f as u32, levels.len(), column, rows, grad, hess, parent)
                }
                _ => self.numeric_split(f as u32, column, rows, grad, hess, parent),
            };
            if let Some(found) = found {
                if best.as_ref().is_none_or(|b| found.gain > b.gain) {
                    best = Some(found);
                }
            }
        }
        best.filter(|b| b.gain > 0.0)
    }

    /// Score a left/right partition of the present rows with missing rows on
    /// either side, keeping the better direction.
    fn score_directions(&self, left: Stats, right: Stats, missing: Stats, parent: Stats) -> Option<(f64, bool)> {
        let mut best: Option<(f64, bool)> = None;
        for default_left in [true, false] {
            let (l, r) = if default_left {
                (left.plus(missing), right)
            } else {
                (left, right.plus(missing))
            };
            if !self.params.is_valid_split(l, r) {
                continue;
            }
            let gain = self.params.compute_gain(l, r, parent);
            if best.is_none_or(|(g, _)| gain > g) {
                best = Some((gain, default_left));
            }
            if missing.count == 0 {
                break;
            }
        }
        best
    }

    #[allow(clippy::too_many_arguments)]
    fn numeric_split(
        &self,
        feature: u32,
        column: ArrayView1<'_, f32>,
        rows: &[u32],
        grad: &[f64],
        hess: &[f64],
        parent: Stats,
    ) -> Option<SplitCandidate> {
        let mut missing = Stats::default();
        let mut present: Vec<(f32, f64, f64)> = Vec::with_capacity(rows.len());
        for &r in rows {
            let (v, g, h) = (column[r as usize], grad[r as usize], hess[r as usize]);
            if v.is_nan() {
                missing.add(g, h);
            } else {
                present.push((v, g, h));
            }
        }
        present.sort_by(|a, b| a.0.total_cmp(&b.0));
        let total = parent.minus(missing);

        let mut left = Stats::default();
        let mut best: Option<SplitCandidate> = None;
        for i in 0..present.len().saturating_sub(1) {
            let (a, g, h) = present[i];
            left.add(g, h);
            let b = present[i + 1].0;
            if a == b {
                continue;
            }
            let mid = a + (b - a) / 2.0;
            let threshold = if mid > a { mid } else { b };
            if let Some((gain, default_left)) = self.score_directions(left, total.minus(left), missing, parent) {
                if best.as_ref().is_none_or(|c| gain > c.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        rule: SplitRule::Numeric { threshold },
                        default_left,
                        gain,
                    });
                }
            }
        }
        best
    }

    #[allow(clippy::too_many_arguments)]
    fn categorical_split(
        &self,
        feature: u32,
        n_levels: usize,
        column: ArrayView1<'_, f32>,
        rows: &[u32],
        grad: &[f64],
        hess: &[f64],
        parent: Stats,
    ) -> Option<SplitCandidate> {
        let mut missing = Stats::default();
        let mut per_level = vec![Stats::default(); n_levels];
        for &r in rows {
            let (v, g, h) = (column[r as usize], grad[r as usize], hess[r as usize]);
            match per_level.get_mut(float_to_category(v) as usize) {
                Some(s) if !v.is_nan() => s.add(g, h),
                _ => missing.add(g, h),
            }
        }

        let mut present: Vec<(u32, Stats)> = per_level
            .iter()
            .enumerate()
            .filter(|(_, s)| s.count > 0)
            .map(|(l, &s)| (l as u32, s))
            .collect();
        if present.len() < 2 {
            return None;
        }
        present.sort_by(|a, b| {
            self.params
                .compute_leaf_weight(a.1)
                .total_cmp(&self.params.compute_leaf_weight(b.1))
                .then(a.0.cmp(&b.0))
        });
        let total = parent.minus(missing);

        let mut left = Stats::default();
        let mut best: Option<(usize, f64, bool)> = None;
        for (i, &(_, s)) in present.iter().enumerate().take(present.len() - 1) {
            left = left.plus(s);
            if let Some((gain, default_left)) = self.score_directions(left, total.minus(left), missing, parent) {
                if best.is_none_or(|(_, g, _)| gain > g) {
                    best = Some((i + 1, gain, default_left));
                }
            }
        }

        best.map(|(n_left, gain, default_left)| {
            let mut right: Vec<u32> = present[n_left..].iter().map(|&(l, _)| l).collect();
            right.sort_unstable();
            SplitCandidate {
                feature,
                rule: SplitRule::Categorical { right },
                default_left,
                gain,
            }
        })
    }
}

/// Leaf value of `tree` for one row of a feature matrix.
pub(crate) fn predict_row_view(tree: &Tree, row: ArrayView1<'_, f32>) -> f32 {
    let mut node: NodeId = 0;
    while !tree.is_leaf(node) {
        node = tree.next_node(node, row[tree.split_index(node) as usize]);
    }
    tree.leaf_value(node)
}
