//! Trees as struct-of-arrays arenas, as produced by the rule-generation trainers.
//!
//! This module provides:
//! - [`Tree`]: Immutable SoA tree storage (an arena of nodes addressed by [`NodeId`])
//! - [`TreeView`]: node accessors and routing shared by both tree forms
//! - [`MutableTree`]: Incremental construction used by the tree trainers
//! - [`TreeSet`]: Trees grown to one depth, as handed over by a trainer
//! - [`TreeValidationError`]: what [`Tree::validate`] rejects

use serde::{Deserialize, Serialize};

/// Node identifier: an index into the tree's SoA arrays. The root is `0`.
pub type NodeId = u32;

/// Type of split in a decision tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SplitType {
    /// `value < threshold` goes left
    #[default]
    Numeric = 0,
    /// Categorical split: go right if the category is in the node's set
    Categorical = 1,
}

// ============================================================================
// CategoriesStorage
// ============================================================================

/// Per-node category sets for categorical splits, stored as one flat array.
///
/// `segments[node] = (start, len)` indexes into `values`; each segment is
/// sorted ascending and lists the categories that go RIGHT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesStorage {
    values: Vec<u32>,
    segments: Vec<(u32, u32)>,
}

impl CategoriesStorage {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from one optional set per node.
    pub fn from_sets(sets: &[Vec<u32>]) -> Self {
        if sets.iter().all(Vec::is_empty) {
            return Self::empty();
        }
        let mut values = Vec::new();
        let mut segments = Vec::with_capacity(sets.len());
        for set in sets {
            let start = values.len() as u32;
            let mut sorted = set.clone();
            sorted.sort_unstable();
            sorted.dedup();
            values.extend_from_slice(&sorted);
            segments.push((start, sorted.len() as u32));
        }
        Self { values, segments }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn segments(&self) -> &[(u32, u32)] {
        &self.segments
    }

    /// Categories that go right at `node` (empty for numeric nodes).
    #[inline]
    pub fn right_categories(&self, node: NodeId) -> &[u32] {
        match self.segments.get(node as usize) {
            Some(&(start, len)) => &self.values[start as usize..(start + len) as usize],
            None => &[],
        }
    }

    #[inline]
    pub fn category_goes_right(&self, node: NodeId, category: u32) -> bool {
        self.right_categories(node).binary_search(&category).is_ok()
    }
}

/// Convert a stored feature value to a category index.
///
/// Negative values are treated as missing by callers; they map to `u32::MAX`
/// here so they never match a category set.
#[inline]
pub fn float_to_category(value: f32) -> u32 {
    if value < 0.0 { u32::MAX } else { value as u32 }
}

// ============================================================================
// TreeView Trait
// ============================================================================

/// Read-only view of a tree for traversal.
///
/// Provides the minimal interface needed to walk a tree from the root,
/// implemented for both [`Tree`] and [`MutableTree`].
pub trait TreeView {
    fn n_nodes(&self) -> usize;

    fn is_leaf(&self, node: NodeId) -> bool;

    /// Feature tested at a split node.
    fn split_index(&self, node: NodeId) -> u32;

    /// `value < threshold` goes left. Meaningless for categorical splits.
    fn split_threshold(&self, node: NodeId) -> f32;

    fn left_child(&self, node: NodeId) -> NodeId;

    fn right_child(&self, node: NodeId) -> NodeId;

    /// Whether missing values go to the left child.
    fn default_left(&self, node: NodeId) -> bool;

    fn split_type(&self, node: NodeId) -> SplitType;

    /// Right-going category sets of all categorical splits.
    fn categories(&self) -> &CategoriesStorage;

    fn leaf_value(&self, node: NodeId) -> f32;

    /// Route a single sample one step down from a split node.
    ///
    /// Missing values (`NaN`, negative categories) follow the node's default
    /// direction.
    #[inline]
    fn next_node(&self, node: NodeId, fvalue: f32) -> NodeId {
        let missing = fvalue.is_nan()
            || (self.split_type(node) == SplitType::Categorical && fvalue < 0.0);
        if missing {
            return if self.default_left(node) {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        match self.split_type(node) {
            SplitType::Numeric => {
                if fvalue < self.split_threshold(node) {
                    self.left_child(node)
                } else {
                    self.right_child(node)
                }
            }
            SplitType::Categorical => {
                if self.categories().category_goes_right(node, float_to_category(fvalue)) {
                    self.right_child(node)
                } else {
                    self.left_child(node)
                }
            }
        }
    }

    /// Leaf reached by `sample`.
    #[inline]
    fn traverse_to_leaf(&self, sample: &[f32]) -> NodeId {
        let mut node = 0;
        while !self.is_leaf(node) {
            let fvalue = sample[self.split_index(node) as usize];
            node = self.next_node(node, fvalue);
        }
        node
    }
}

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("node {node} has {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} references itself as a child")]
    SelfLoop { node: NodeId },
    #[error("node {node} is reachable by more than one path")]
    DuplicateVisit { node: NodeId },
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
    #[error("category segments ({segments_len}) not sized to nodes ({n_nodes})")]
    CategoricalSegmentsLenMismatch { segments_len: usize, n_nodes: usize },
}

// ============================================================================
// Tree
// ============================================================================

/// Structure-of-Arrays tree storage.
///
/// Stores tree nodes in flat arrays. Child indices are local to this tree
/// (0 = root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f32]>,
    left_children: Box<[u32]>,
    right_children: Box<[u32]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f32]>,
    split_types: Box<[SplitType]>,
    categories: CategoriesStorage,
}

impl Tree {
    /// Build a tree from per-node arrays of equal length.
    ///
    /// All arrays must have the same length (number of nodes). For trees
    /// without categorical splits pass [`CategoriesStorage::empty()`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        split_indices: Vec<u32>,
        split_thresholds: Vec<f32>,
        left_children: Vec<u32>,
        right_children: Vec<u32>,
        default_left: Vec<bool>,
        is_leaf: Vec<bool>,
        leaf_values: Vec<f32>,
        split_types: Vec<SplitType>,
        categories: CategoriesStorage,
    ) -> Self {
        debug_assert!(
            [
                split_thresholds.len(),
                left_children.len(),
                right_children.len(),
                default_left.len(),
                is_leaf.len(),
                leaf_values.len(),
                split_types.len(),
            ]
            .iter()
            .all(|&len| len == split_indices.len()),
            "node arrays differ in length"
        );

        Self {
            split_indices: split_indices.into_boxed_slice(),
            split_thresholds: split_thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: default_left.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
            split_types: split_types.into_boxed_slice(),
            categories,
        }
    }

    /// Predict the leaf value for one sample.
    #[cfg(test)]
    pub(crate) fn predict_row(&self, features: &[f32]) -> f32 {
        self.leaf_value(self.traverse_to_leaf(features))
    }

    /// Depth of every node (root = 0), computed by walking child links.
    pub fn node_depths(&self) -> Vec<u32> {
        let mut depths = vec![0u32; self.n_nodes()];
        let mut stack = vec![0 as NodeId];
        while let Some(node) = stack.pop() {
            if self.is_leaf(node) {
                continue;
            }
            let d = depths[node as usize] + 1;
            for child in [self.left_child(node), self.right_child(node)] {
                depths[child as usize] = d;
                stack.push(child);
            }
        }
        depths
    }

    /// Check child bounds, self loops, cycles, shared and unreachable nodes.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }

        let has_cat_split = self
            .split_types
            .iter()
            .zip(self.is_leaf.iter())
            .any(|(t, &leaf)| !leaf && matches!(t, SplitType::Categorical));
        if has_cat_split {
            let segments_len = self.categories.segments().len();
            if segments_len != n_nodes {
                return Err(TreeValidationError::CategoricalSegmentsLenMismatch {
                    segments_len,
                    n_nodes,
                });
            }
        }

        // A valid tree is reached from the root exactly once per node, so a
        // second visit is either a cycle (node is on the current path) or a
        // shared subtree.
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unseen,
            OnPath,
            Done,
        }
        enum Step {
            Enter(NodeId),
            Leave(NodeId),
        }

        let mut marks = vec![Mark::Unseen; n_nodes];
        let mut pending = vec![Step::Enter(0)];
        while let Some(step) = pending.pop() {
            let node = match step {
                Step::Leave(node) => {
                    marks[node as usize] = Mark::Done;
                    continue;
                }
                Step::Enter(node) => node,
            };
            match marks[node as usize] {
                Mark::Unseen => {}
                Mark::OnPath => return Err(TreeValidationError::CycleDetected { node }),
                Mark::Done => return Err(TreeValidationError::DuplicateVisit { node }),
            }
            marks[node as usize] = Mark::OnPath;
            pending.push(Step::Leave(node));
            if self.is_leaf(node) {
                continue;
            }

            let children = [("left", self.left_child(node)), ("right", self.right_child(node))];
            for (side, child) in children {
                if child == node {
                    return Err(TreeValidationError::SelfLoop { node });
                }
                if child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node,
                        side,
                        child,
                        n_nodes,
                    });
                }
            }
            pending.extend(children.iter().rev().map(|&(_, child)| Step::Enter(child)));
        }

        if let Some(i) = marks.iter().position(|&m| m == Mark::Unseen) {
            return Err(TreeValidationError::UnreachableNode { node: i as u32 });
        }

        Ok(())
    }
}

impl TreeView for Tree {
    #[inline]
    fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    #[inline]
    fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    fn split_threshold(&self, node: NodeId) -> f32 {
        self.split_thresholds[node as usize]
    }

    #[inline]
    fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    fn split_type(&self, node: NodeId) -> SplitType {
        self.split_types[node as usize]
    }

    #[inline]
    fn categories(&self) -> &CategoriesStorage {
        &self.categories
    }

    #[inline]
    fn leaf_value(&self, node: NodeId) -> f32 {
        self.leaf_values[node as usize]
    }
}

// ============================================================================
// MutableTree
// ============================================================================

/// Growable tree used during training.
///
/// Nodes are appended in creation order; a freshly allocated node is a leaf
/// with value `0.0` until it is split or given a value.
#[derive(Debug, Clone, Default)]
pub struct MutableTree {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
    split_types: Vec<SplitType>,
    category_sets: Vec<Vec<u32>>,
    categories: CategoriesStorage,
}

impl MutableTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> NodeId {
        let id = self.is_leaf.len() as NodeId;
        self.split_indices.push(0);
        self.split_thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.default_left.push(true);
        self.is_leaf.push(true);
        self.leaf_values.push(0.0);
        self.split_types.push(SplitType::Numeric);
        self.category_sets.push(Vec::new());
        id
    }

    /// Allocate the root node. Must be called once, first.
    pub fn init_root(&mut self) -> NodeId {
        debug_assert!(self.is_leaf.is_empty(), "root already initialised");
        self.alloc()
    }

    /// Turn `node` into a numeric split and allocate its two children.
    pub fn apply_numeric_split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f32,
        default_left: bool,
    ) -> (NodeId, NodeId) {
        self.apply_split(node, feature, threshold, default_left, SplitType::Numeric)
    }

    /// Turn `node` into a categorical split; `right_categories` go right.
    pub fn apply_categorical_split(
        &mut self,
        node: NodeId,
        feature: u32,
        right_categories: Vec<u32>,
        default_left: bool,
    ) -> (NodeId, NodeId) {
        self.category_sets[node as usize] = right_categories;
        self.apply_split(node, feature, 0.0, default_left, SplitType::Categorical)
    }

    fn apply_split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f32,
        default_left: bool,
        split_type: SplitType,
    ) -> (NodeId, NodeId) {
        let left = self.alloc();
        let right = self.alloc();
        let i = node as usize;
        self.split_indices[i] = feature;
        self.split_thresholds[i] = threshold;
        self.default_left[i] = default_left;
        self.split_types[i] = split_type;
        self.is_leaf[i] = false;
        self.left_children[i] = left;
        self.right_children[i] = right;
        self.refresh_categories();
        (left, right)
    }

    fn refresh_categories(&mut self) {
        self.categories = CategoriesStorage::from_sets(&self.category_sets);
    }

    /// Set the value of a leaf node.
    pub fn make_leaf(&mut self, node: NodeId, value: f32) {
        let i = node as usize;
        self.is_leaf[i] = true;
        self.leaf_values[i] = value;
    }

    /// Freeze into an immutable [`Tree`].
    pub fn freeze(self) -> Tree {
        let categories = CategoriesStorage::from_sets(&self.category_sets);
        Tree::new(
            self.split_indices,
            self.split_thresholds,
            self.left_children,
            self.right_children,
            self.default_left,
            self.is_leaf,
            self.leaf_values,
            self.split_types,
            categories,
        )
    }
}

impl TreeView for MutableTree {
    fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    fn split_threshold(&self, node: NodeId) -> f32 {
        self.split_thresholds[node as usize]
    }

    fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    fn split_type(&self, node: NodeId) -> SplitType {
        self.split_types[node as usize]
    }

    fn categories(&self) -> &CategoriesStorage {
        &self.categories
    }

    fn leaf_value(&self, node: NodeId) -> f32 {
        self.leaf_values[node as usize]
    }
}

// ============================================================================
// TreeSet
// ============================================================================

/// Trees grown to a common maximum depth.
///
/// For multinomial responses trainers grow one tree per class per round;
/// `tree_groups[i]` records the class of tree `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSet {
    depth: u32,
    trees: Vec<Tree>,
    tree_groups: Vec<u32>,
}

impl TreeSet {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            trees: Vec::new(),
            tree_groups: Vec::new(),
        }
    }

    pub fn push_tree(&mut self, tree: Tree, group: u32) {
        self.trees.push(tree);
        self.tree_groups.push(group);
    }

    /// Maximum depth the trees were grown to.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn tree_groups(&self) -> &[u32] {
        &self.tree_groups
    }
}

// ============================================================================
// Tree literal (test / doc helper)
// ============================================================================

/// Node-by-node tree assembly used by the [`tree!`](crate::tree) macro.
#[doc(hidden)]
#[derive(Debug, Default)]
pub struct TreeLiteral {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
    split_types: Vec<SplitType>,
    category_sets: Vec<Vec<u32>>,
}

#[doc(hidden)]
impl TreeLiteral {
    fn ensure(&mut self, id: usize) {
        if self.is_leaf.len() <= id {
            let n = id + 1;
            self.split_indices.resize(n, 0);
            self.split_thresholds.resize(n, 0.0);
            self.left_children.resize(n, 0);
            self.right_children.resize(n, 0);
            self.default_left.resize(n, true);
            self.is_leaf.resize(n, true);
            self.leaf_values.resize(n, 0.0);
            self.split_types.resize(n, SplitType::Numeric);
            self.category_sets.resize(n, Vec::new());
        }
    }

    fn split(&mut self, id: usize, feature: u32, default_left: bool, left: u32, right: u32) {
        self.ensure(id);
        self.split_indices[id] = feature;
        self.default_left[id] = default_left;
        self.is_leaf[id] = false;
        self.left_children[id] = left;
        self.right_children[id] = right;
    }

    pub fn numeric(&mut self, id: usize, feature: u32, threshold: f32, default_left: bool, left: u32, right: u32) {
        self.split(id, feature, default_left, left, right);
        self.split_thresholds[id] = threshold;
    }

    pub fn categorical(&mut self, id: usize, feature: u32, right_categories: Vec<u32>, default_left: bool, left: u32, right: u32) {
        self.split(id, feature, default_left, left, right);
        self.split_types[id] = SplitType::Categorical;
        self.category_sets[id] = right_categories;
    }

    pub fn leaf(&mut self, id: usize, value: f32) {
        self.ensure(id);
        self.is_leaf[id] = true;
        self.leaf_values[id] = value;
    }

    pub fn finish(self) -> Tree {
        let categories = CategoriesStorage::from_sets(&self.category_sets);
        Tree::new(
            self.split_indices,
            self.split_thresholds,
            self.left_children,
            self.right_children,
            self.default_left,
            self.is_leaf,
            self.leaf_values,
            self.split_types,
            categories,
        )
    }
}

/// Build a [`Tree`] from a node listing.
///
/// `L`/`R` give the default direction for missing values.
///
/// ```
/// use rulefit::repr::TreeView;
///
/// let tree = rulefit::tree! {
///     0 => num(0, 0.5, L) -> 1, 2,
///     1 => leaf(-1.0),
///     2 => cat(1, [1, 3], R) -> 3, 4,
///     3 => leaf(0.0),
///     4 => leaf(1.0),
/// };
/// let leaf = tree.traverse_to_leaf(&[0.7, 3.0]);
/// assert_eq!(tree.leaf_value(leaf), 1.0);
/// ```
#[macro_export]
macro_rules! tree {
    ($($id:literal => $kind:ident $args:tt $(-> $l:literal, $r:literal)?),* $(,)?) => {{
        let mut literal = $crate::repr::TreeLiteral::default();
        $( $crate::__tree_node!(literal, $id, $kind $args $(, $l, $r)?); )*
        literal.finish()
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tree_node {
    ($b:ident, $id:literal, num($f:expr, $t:expr, $d:ident), $l:literal, $r:literal) => {
        $b.numeric($id, $f, $t, $crate::__tree_default_left!($d), $l, $r)
    };
    ($b:ident, $id:literal, cat($f:expr, [$($c:expr),* $(,)?], $d:ident), $l:literal, $r:literal) => {
        $b.categorical($id, $f, vec![$($c),*], $crate::__tree_default_left!($d), $l, $r)
    };
    ($b:ident, $id:literal, leaf($v:expr)) => {
        $b.leaf($id, $v)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tree_default_left {
    (L) => {
        true
    };
    (R) => {
        false
    };
}
