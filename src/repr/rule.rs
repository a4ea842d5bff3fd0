//! Rules: conjunctions of conditions along a root-to-node path.

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use crate::data::FrameSchema;

/// Where a rule was first extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleOrigin {
    /// Depth the source tree set was grown to.
    pub depth: u32,
    /// Tree index within its tree set.
    pub tree: u32,
    /// Node index within the tree.
    pub node: u32,
}

/// Canonical form of a rule: its conditions in sorted order.
///
/// Two rules with equal signatures fire on exactly the same rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleSignature(Vec<Condition>);

impl RuleSignature {
    pub fn conditions(&self) -> &[Condition] {
        &self.0
    }
}

/// An ordered conjunction of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    conditions: Vec<Condition>,
    origin: RuleOrigin,
}

impl Rule {
    pub fn new(conditions: Vec<Condition>, origin: RuleOrigin) -> Self {
        Self { conditions, origin }
    }

    /// Number of conditions.
    #[inline]
    pub fn length(&self) -> usize {
        self.conditions.len()
    }

    #[inline]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[inline]
    pub fn origin(&self) -> RuleOrigin {
        self.origin
    }

    pub fn signature(&self) -> RuleSignature {
        let mut conditions = self.conditions.clone();
        conditions.sort();
        RuleSignature(conditions)
    }

    /// Evaluate against a full feature row. Out-of-range features are missing.
    #[inline]
    pub fn evaluate(&self, row: &[f32]) -> bool {
        self.conditions.iter().all(|c| {
            let value = row.get(c.feature() as usize).copied().unwrap_or(f32::NAN);
            c.evaluate(value)
        })
    }

    /// Variable name of this rule's activation column, e.g. `M3T12N7`.
    pub fn name(&self) -> String {
        let RuleOrigin { depth, tree, node } = self.origin;
        format!("M{depth}T{tree}N{node}")
    }

    /// e.g. `(age < 30.5 or age is NA) & (color in {red, blue})`
    pub fn describe(&self, schema: &FrameSchema) -> String {
        self.conditions
            .iter()
            .map(|c| format!("({})", c.describe(schema)))
            .collect::<Vec<_>>()
            .join(" & ")
    }

    /// Feature indices referenced by any condition.
    pub fn features(&self) -> impl Iterator<Item = u32> + '_ {
        self.conditions.iter().map(Condition::feature)
    }
}
