//! Deduplicated, insertion-ordered rule collection.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::repr::{Rule, RuleSignature};

/// Error raised when restoring an ensemble that violates uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule {second} duplicates rule {first}")]
pub struct DuplicateRuleError {
    pub first: String,
    pub second: String,
}

/// Rules keyed by canonical signature.
///
/// The first rule seen for a signature is kept; later duplicates are
/// dropped. Indices are stable: entries are only ever appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Rule>", into = "Vec<Rule>")]
pub struct RuleEnsemble {
    rules: Vec<Rule>,
    index: HashMap<RuleSignature, usize>,
}

impl RuleEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule` unless an equivalent rule is present. Returns whether it
    /// was added.
    pub fn insert(&mut self, rule: Rule) -> bool {
        let signature = rule.signature();
        if self.index.contains_key(&signature) {
            return false;
        }
        self.index.insert(signature, self.rules.len());
        self.rules.push(rule);
        true
    }

    /// Fold another ensemble's rules in after this one's, in its order.
    pub fn merge(&mut self, other: RuleEnsemble) {
        for rule in other.rules {
            self.insert(rule);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Stable index of the rule with this signature.
    pub fn index_of(&self, signature: &RuleSignature) -> Option<usize> {
        self.index.get(signature).copied()
    }

    /// Feature indices referenced by any rule.
    pub fn referenced_features(&self) -> BTreeSet<usize> {
        self.rules
            .iter()
            .flat_map(Rule::features)
            .map(|f| f as usize)
            .collect()
    }
}

impl PartialEq for RuleEnsemble {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl<'a> IntoIterator for &'a RuleEnsemble {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl FromIterator<Rule> for RuleEnsemble {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut ensemble = RuleEnsemble::new();
        for rule in iter {
            ensemble.insert(rule);
        }
        ensemble
    }
}

impl TryFrom<Vec<Rule>> for RuleEnsemble {
    type Error = DuplicateRuleError;

    fn try_from(rules: Vec<Rule>) -> Result<Self, Self::Error> {
        let mut ensemble = RuleEnsemble::new();
        for rule in rules {
            let signature = rule.signature();
            if let Some(&first) = ensemble.index.get(&signature) {
                return Err(DuplicateRuleError {
                    first: ensemble.rules[first].name(),
                    second: rule.name(),
                });
            }
            ensemble.insert(rule);
        }
        Ok(ensemble)
    }
}

impl From<RuleEnsemble> for Vec<Rule> {
    fn from(ensemble: RuleEnsemble) -> Self {
        ensemble.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::{Condition, Operator, RuleOrigin};

    fn rule(node: u32, conditions: Vec<Condition>) -> Rule {
        Rule::new(conditions, RuleOrigin { depth: 2, tree: 0, node })
    }

    fn lt(feature: u32, t: f32) -> Condition {
        Condition::numeric(feature, t, Operator::LessThan, false)
    }

    #[test]
    fn first_seen_wins() {
        let mut ensemble = RuleEnsemble::new();
        assert!(ensemble.insert(rule(1, vec![lt(0, 1.0), lt(1, 2.0)])));
        assert!(!ensemble.insert(rule(5, vec![lt(1, 2.0), lt(0, 1.0)])));
        assert!(ensemble.insert(rule(2, vec![lt(0, 1.0)])));
        assert_eq!(ensemble.len(), 2);
        assert_eq!(ensemble.get(0).unwrap().origin().node, 1);
        assert_eq!(ensemble.index_of(&rule(9, vec![lt(0, 1.0)]).signature()), Some(1));
    }

    #[test]
    fn merge_matches_sequential_fold() {
        let candidates = vec![
            rule(1, vec![lt(0, 1.0)]),
            rule(2, vec![lt(1, 1.0)]),
            rule(3, vec![lt(0, 1.0)]),
            rule(4, vec![lt(2, 1.0)]),
            rule(5, vec![lt(1, 1.0)]),
        ];
        let sequential: RuleEnsemble = candidates.iter().cloned().collect();

        let mut merged: RuleEnsemble = candidates[..2].iter().cloned().collect();
        merged.merge(candidates[2..].iter().cloned().collect());
        assert_eq!(merged, sequential);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn deserialization_rejects_duplicates() {
        let rules = vec![rule(1, vec![lt(0, 1.0)]), rule(2, vec![lt(0, 1.0)])];
        let json = serde_json::to_string(&rules).unwrap();
        let err = serde_json::from_str::<RuleEnsemble>(&json).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
    }

    #[test]
    fn referenced_features() {
        let ensemble: RuleEnsemble = vec![rule(1, vec![lt(3, 1.0), lt(0, 1.0)]), rule(2, vec![lt(3, 2.0)])]
            .into_iter()
            .collect();
        assert_eq!(ensemble.referenced_features().into_iter().collect::<Vec<_>>(), vec![0, 3]);
    }
}
