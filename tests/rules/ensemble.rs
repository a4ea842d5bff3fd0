//! Rule ensemble folding and persistence.

use rstest::rstest;
use rulefit::RuleEnsemble;
use rulefit::repr::{Condition, Operator, Rule, RuleOrigin};

fn rule(node: u32, conditions: Vec<Condition>) -> Rule {
    Rule::new(conditions, RuleOrigin { depth: 2, tree: node / 10, node })
}

fn lt(feature: u32, t: f32) -> Condition {
    Condition::numeric(feature, t, Operator::LessThan, false)
}

fn ge(feature: u32, t: f32) -> Condition {
    Condition::numeric(feature, t, Operator::GreaterOrEqual, true)
}

/// Candidates with duplicates spread across the sequence, including a
/// reordered copy of an earlier rule.
fn candidates() -> Vec<Rule> {
    vec![
        rule(1, vec![lt(0, 1.0), lt(1, 2.0)]),
        rule(2, vec![lt(0, 1.0), ge(1, 2.0)]),
        rule(3, vec![ge(0, 1.0)]),
        rule(11, vec![lt(1, 2.0), lt(0, 1.0)]),
        rule(12, vec![ge(0, 1.0), Condition::categorical(2, vec![0, 2], false)]),
        rule(13, vec![ge(0, 1.0)]),
        rule(21, vec![lt(0, 1.5)]),
        rule(22, vec![lt(0, 1.0), ge(1, 2.0)]),
        rule(23, vec![Condition::categorical(2, vec![2, 0], false), ge(0, 1.0)]),
    ]
}

fn sequential() -> RuleEnsemble {
    candidates().into_iter().collect()
}

#[test]
fn sequential_fold_keeps_first_seen() {
    let ensemble = sequential();
    assert_eq!(ensemble.len(), 5);
    let nodes: Vec<u32> = ensemble.iter().map(|r| r.origin().node).collect();
    assert_eq!(nodes, vec![1, 2, 3, 12, 21]);
    for (i, rule) in ensemble.iter().enumerate() {
        assert_eq!(ensemble.index_of(&rule.signature()), Some(i));
    }
}

#[rstest]
#[case(&[9])]
#[case(&[1, 8])]
#[case(&[3, 3, 3])]
#[case(&[2, 5, 2])]
#[case(&[1, 1, 1, 1, 1, 1, 1, 1, 1])]
fn any_grouping_merges_to_the_sequential_fold(#[case] chunks: &[usize]) {
    let mut remaining = candidates().into_iter();
    let partials: Vec<RuleEnsemble> = chunks
        .iter()
        .map(|&n| remaining.by_ref().take(n).collect())
        .collect();

    let merged = partials.into_iter().fold(RuleEnsemble::new(), |mut acc, partial| {
        acc.merge(partial);
        acc
    });
    assert_eq!(merged, sequential());
}

#[test]
fn json_round_trip_preserves_order() {
    let ensemble = sequential();
    let json = serde_json::to_string(&ensemble).unwrap();
    let restored: RuleEnsemble = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, ensemble);
    let names = |e: &RuleEnsemble| e.iter().map(Rule::name).collect::<Vec<_>>();
    assert_eq!(names(&restored), names(&ensemble));
}

#[test]
fn duplicate_signatures_are_rejected_on_load() {
    let rules = vec![rule(1, vec![lt(0, 1.0), lt(1, 2.0)]), rule(11, vec![lt(1, 2.0), lt(0, 1.0)])];
    let json = serde_json::to_string(&rules).unwrap();
    assert!(serde_json::from_str::<RuleEnsemble>(&json).is_err());
}
