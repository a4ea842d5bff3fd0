//! Single split tests copied from tree nodes.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::tree::float_to_category;
use crate::data::FrameSchema;

/// Comparison applied by a numeric condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    /// `value < threshold` (left child of a numeric split)
    LessThan,
    /// `value >= threshold` (right child of a numeric split)
    GreaterOrEqual,
}

impl Operator {
    #[inline]
    pub fn holds(self, value: f32, threshold: f32) -> bool {
        match self {
            Operator::LessThan => value < threshold,
            Operator::GreaterOrEqual => value >= threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
        }
    }
}

/// What a condition tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConditionKind {
    Numeric { threshold: f32, operator: Operator },
    /// Level codes on the "true" side, sorted ascending, no duplicates.
    Categorical { categories: Vec<u32> },
}

impl ConditionKind {
    fn rank(&self) -> u8 {
        match self {
            ConditionKind::Numeric { .. } => 0,
            ConditionKind::Categorical { .. } => 1,
        }
    }
}

// Thresholds are compared bit-for-bit: they come verbatim from tree splits.
impl PartialEq for ConditionKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ConditionKind::Numeric { threshold: a, operator: oa },
                ConditionKind::Numeric { threshold: b, operator: ob },
            ) => a.to_bits() == b.to_bits() && oa == ob,
            (
                ConditionKind::Categorical { categories: a },
                ConditionKind::Categorical { categories: b },
            ) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConditionKind {}

impl Hash for ConditionKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            ConditionKind::Numeric { threshold, operator } => {
                threshold.to_bits().hash(state);
                operator.hash(state);
            }
            ConditionKind::Categorical { categories } => categories.hash(state),
        }
    }
}

impl Ord for ConditionKind {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                ConditionKind::Numeric { threshold: a, operator: oa },
                ConditionKind::Numeric { threshold: b, operator: ob },
            ) => a.total_cmp(b).then(oa.cmp(ob)),
            (
                ConditionKind::Categorical { categories: a },
                ConditionKind::Categorical { categories: b },
            ) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for ConditionKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One test on one feature.
///
/// Ordering is (feature, kind, missing) which is the canonical order used by
/// rule signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Condition {
    feature: u32,
    kind: ConditionKind,
    /// Whether missing values satisfy the condition.
    missing: bool,
}

impl Condition {
    pub fn numeric(feature: u32, threshold: f32, operator: Operator, missing: bool) -> Self {
        Self {
            feature,
            kind: ConditionKind::Numeric { threshold, operator },
            missing,
        }
    }

    /// Categorical condition; `categories` is normalised to sorted unique codes.
    pub fn categorical(feature: u32, mut categories: Vec<u32>, missing: bool) -> Self {
        categories.sort_unstable();
        categories.dedup();
        Self {
            feature,
            kind: ConditionKind::Categorical { categories },
            missing,
        }
    }

    #[inline]
    pub fn feature(&self) -> u32 {
        self.feature
    }

    #[inline]
    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    #[inline]
    pub fn missing(&self) -> bool {
        self.missing
    }

    /// Evaluate against a single feature value. `NaN` is missing, as is a
    /// negative code for categorical conditions.
    #[inline]
    pub fn evaluate(&self, value: f32) -> bool {
        if value.is_nan() {
            return self.missing;
        }
        match &self.kind {
            ConditionKind::Numeric { threshold, operator } => operator.holds(value, *threshold),
            ConditionKind::Categorical { categories } => {
                if value < 0.0 {
                    return self.missing;
                }
                categories.binary_search(&float_to_category(value)).is_ok()
            }
        }
    }

    /// Human-readable form using schema names and level names.
    pub fn describe(&self, schema: &FrameSchema) -> String {
        let name = schema.name(self.feature as usize);
        let test = match &self.kind {
            ConditionKind::Numeric { threshold, operator } => {
                format!("{name} {} {threshold}", operator.symbol())
            }
            ConditionKind::Categorical { categories } => {
                let meta = schema.get(self.feature as usize);
                let levels: Vec<String> = categories
                    .iter()
                    .map(|&c| {
                        meta.and_then(|m| m.level_name(c))
                            .map_or_else(|| c.to_string(), str::to_owned)
                    })
                    .collect();
                format!("{name} in {{{}}}", levels.join(", "))
            }
        };
        if self.missing {
            format!("{test} or {name} is NA")
        } else {
            test
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("f{}", self.feature);
        match &self.kind {
            ConditionKind::Numeric { threshold, operator } => {
                write!(f, "{name} {} {threshold}", operator.symbol())?
            }
            ConditionKind::Categorical { categories } => write!(f, "{name} in {categories:?}")?,
        }
        if self.missing {
            write!(f, " or {name} is NA")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureMeta;
    use rstest::rstest;

    #[rstest]
    #[case(Operator::LessThan, 0.4, true)]
    #[case(Operator::LessThan, 0.5, false)]
    #[case(Operator::GreaterOrEqual, 0.5, true)]
    #[case(Operator::GreaterOrEqual, 0.4, false)]
    fn numeric_condition_matches_tree_routing(
        #[case] operator: Operator,
        #[case] value: f32,
        #[case] expected: bool,
    ) {
        let cond = Condition::numeric(0, 0.5, operator, false);
        assert_eq!(cond.evaluate(value), expected);
    }

    #[test]
    fn missing_follows_stored_direction() {
        let included = Condition::numeric(0, 0.5, Operator::LessThan, true);
        let excluded = Condition::numeric(0, 0.5, Operator::LessThan, false);
        assert!(included.evaluate(f32::NAN));
        assert!(!excluded.evaluate(f32::NAN));

        let cat = Condition::categorical(0, vec![1], true);
        assert!(cat.evaluate(-1.0));
    }

    #[test]
    fn categorical_condition_is_normalised() {
        let a = Condition::categorical(2, vec![3, 1, 3], false);
        let b = Condition::categorical(2, vec![1, 3], false);
        assert_eq!(a, b);
        assert!(a.evaluate(3.0));
        assert!(!a.evaluate(2.0));
        assert!(!a.evaluate(7.0));
    }

    #[test]
    fn thresholds_compare_bitwise() {
        let a = Condition::numeric(0, 0.1, Operator::LessThan, false);
        let b = Condition::numeric(0, 0.1 + f32::EPSILON, Operator::LessThan, false);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn canonical_order() {
        let mut conds = vec![
            Condition::categorical(1, vec![0], false),
            Condition::numeric(1, 2.0, Operator::LessThan, false),
            Condition::numeric(0, 5.0, Operator::GreaterOrEqual, true),
            Condition::numeric(0, 5.0, Operator::LessThan, false),
        ];
        conds.sort();
        assert_eq!(conds[0], Condition::numeric(0, 5.0, Operator::LessThan, false));
        assert_eq!(conds[1], Condition::numeric(0, 5.0, Operator::GreaterOrEqual, true));
        assert_eq!(conds[2], Condition::numeric(1, 2.0, Operator::LessThan, false));
        assert_eq!(conds[3], Condition::categorical(1, vec![0], false));
    }

    #[test]
    fn describe_uses_names() {
        let schema = FrameSchema::from_features(vec![
            FeatureMeta::numeric("age"),
            FeatureMeta::categorical("color", vec!["blue".into(), "green".into(), "red".into()]),
        ]);
        let num = Condition::numeric(0, 30.5, Operator::LessThan, true);
        assert_eq!(num.describe(&schema), "age < 30.5 or age is NA");
        let cat = Condition::categorical(1, vec![2, 0], false);
        assert_eq!(cat.describe(&schema), "color in {blue, red}");
    }
}
