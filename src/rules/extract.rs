//! Rule extraction from tree paths.
//!
//! Every node of every tree (leaves included, the root excluded) yields one
//! candidate rule: the conditions along its root-to-node path. A node at
//! depth `d` has a rule of length `d`. Candidates outside
//! `[min_length, max_length]` are dropped.
//!
//! A numeric split `x < t` gives the left child `x < t` and the right child
//! `x >= t`; a categorical split whose set `S` goes right gives the right
//! child `x in S` and the left child `x in (levels \ S)`. Missing values
//! satisfy the condition on the side the split sends them to.
//!
//! Trees are processed in parallel, each into a locally deduplicated
//! ensemble; the partial ensembles are then merged in tree order, which gives
//! the same result as a sequential fold over all candidates.

use crate::data::{FeatureType, FrameSchema};
use crate::repr::{Condition, NodeId, Operator, Rule, RuleOrigin, SplitType, Tree, TreeSet, TreeView};
use crate::utils::Parallelism;

use super::ensemble::RuleEnsemble;

/// Errors raised during extraction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("{candidates} candidate rules exceed the limit of {limit}")]
    ResourceLimit { candidates: usize, limit: usize },
    #[error("invalid tree {tree} at depth {depth}: {reason}")]
    InvalidTree { depth: u32, tree: usize, reason: String },
}

/// Extracts rules from tree sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathExtractor {
    pub min_length: u32,
    pub max_length: u32,
    /// Upper bound on candidates before deduplication.
    pub max_candidates: usize,
}

impl PathExtractor {
    pub fn new(min_length: u32, max_length: u32) -> Self {
        Self {
            min_length,
            max_length,
            max_candidates: 1_000_000,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    #[inline]
    fn in_range(&self, length: u32) -> bool {
        length >= self.min_length.max(1) && length <= self.max_length
    }

    /// Structural validation plus split/schema consistency.
    pub fn check_tree(&self, tree: &Tree, schema: &FrameSchema) -> Result<(), String> {
        tree.validate().map_err(|e| e.to_string())?;
        for node in 0..tree.n_nodes() as NodeId {
            if tree.is_leaf(node) {
                continue;
            }
            let feature = tree.split_index(node) as usize;
            let Some(meta) = schema.get(feature) else {
                return Err(format!(
                    "node {node} splits on feature {feature}, schema has {}",
                    schema.n_features()
                ));
            };
            if tree.split_type(node) == SplitType::Categorical && !meta.feature_type.is_categorical() {
                return Err(format!(
                    "node {node} has a categorical split on numeric feature '{}'",
                    meta.name
                ));
            }
        }
        Ok(())
    }

    /// Number of candidates `extract` would materialize. Trees must be valid.
    pub fn count_candidates(&self, sets: &[TreeSet]) -> usize {
        sets.iter()
            .flat_map(TreeSet::trees)
            .map(|tree| {
                tree.node_depths()
                    .into_iter()
                    .filter(|&d| self.in_range(d))
                    .count()
            })
            .sum()
    }

    /// Candidate rules of one tree, in pre-order (left before right).
    pub fn tree_candidates(&self, tree: &Tree, depth: u32, tree_index: usize, schema: &FrameSchema) -> Vec<Rule> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, Vec<Condition>)> = vec![(0, Vec::new())];

        while let Some((node, path)) = stack.pop() {
            let length = path.len() as u32;
            if length > 0 && self.in_range(length) {
                out.push(Rule::new(
                    path.clone(),
                    RuleOrigin {
                        depth,
                        tree: tree_index as u32,
                        node,
                    },
                ));
            }
            if tree.is_leaf(node) || length >= self.max_length {
                continue;
            }

            let (left, right) = split_conditions(tree, node, schema);
            let mut right_path = path.clone();
            right_path.push(right);
            let mut left_path = path;
            left_path.push(left);
            stack.push((tree.right_child(node), right_path));
            stack.push((tree.left_child(node), left_path));
        }

        out
    }

    /// Extract the deduplicated rule ensemble from all tree sets.
    ///
    /// # Errors
    ///
    /// [`ExtractError::InvalidTree`] for malformed trees and
    /// [`ExtractError::ResourceLimit`] when the candidate count exceeds
    /// `max_candidates`. Both are raised before any rule is built.
    pub fn extract(
        &self,
        sets: &[TreeSet],
        schema: &FrameSchema,
        parallelism: Parallelism,
    ) -> Result<RuleEnsemble, ExtractError> {
        for set in sets {
            for (t, tree) in set.trees().iter().enumerate() {
                self.check_tree(tree, schema)
                    .map_err(|reason| ExtractError::InvalidTree {
                        depth: set.depth(),
                        tree: t,
                        reason,
                    })?;
            }
        }

        let candidates = self.count_candidates(sets);
        if candidates > self.max_candidates {
            return Err(ExtractError::ResourceLimit {
                candidates,
                limit: self.max_candidates,
            });
        }

        let jobs: Vec<(u32, usize, &Tree)> = sets
            .iter()
            .flat_map(|set| {
                set.trees()
                    .iter()
                    .enumerate()
                    .map(move |(t, tree)| (set.depth(), t, tree))
            })
            .collect();
        let partials = parallelism.maybe_par_map(jobs, |(depth, t, tree)| {
            self.tree_candidates(tree, depth, t, schema)
                .into_iter()
                .collect::<RuleEnsemble>()
        });

        let ensemble = partials.into_iter().fold(RuleEnsemble::new(), |mut acc, partial| {
            acc.merge(partial);
            acc
        });
        log::info!(
            "extracted {} candidate rules from {} trees, {} unique",
            candidates,
            sets.iter().map(TreeSet::n_trees).sum::<usize>(),
            ensemble.len()
        );
        Ok(ensemble)
    }
}

/// Conditions for the (left, right) children of a split node.
fn split_conditions(tree: &Tree, node: NodeId, schema: &FrameSchema) -> (Condition, Condition) {
    let feature = tree.split_index(node);
    let default_left = tree.default_left(node);
    match tree.split_type(node) {
        SplitType::Numeric => {
            let threshold = tree.split_threshold(node);
            (
                Condition::numeric(feature, threshold, Operator::LessThan, default_left),
                Condition::numeric(feature, threshold, Operator::GreaterOrEqual, !default_left),
            )
        }
        SplitType::Categorical => {
            let right = tree.categories().right_categories(node);
            let n_levels = match schema.get(feature as usize).map(|m| &m.feature_type) {
                Some(FeatureType::Categorical { levels }) => levels.len() as u32,
                _ => 0,
            };
            let left: Vec<u32> = (0..n_levels)
                .filter(|c| right.binary_search(c).is_err())
                .collect();
            (
                Condition::categorical(feature, left, default_left),
                Condition::categorical(feature, right.to_vec(), !default_left),
            )
        }
    }
}
