//! Path extraction over hand-built trees.

use rstest::rstest;
use rulefit::data::{FeatureMeta, FrameSchema};
use rulefit::repr::{Tree, TreeSet};
use rulefit::rules::{ExtractError, PathExtractor};
use rulefit::tree;
use rulefit::utils::Parallelism;

fn schema() -> FrameSchema {
    FrameSchema::from_features(vec![
        FeatureMeta::numeric("x"),
        FeatureMeta::categorical("c", vec!["a".into(), "b".into(), "c".into()]),
        FeatureMeta::numeric("z"),
    ])
}

fn tree_a() -> Tree {
    tree! {
        0 => num(0, 0.5, L) -> 1, 2,
        1 => num(2, 1.0, R) -> 3, 4,
        2 => cat(1, [2], L) -> 5, 6,
        3 => leaf(1.0),
        4 => num(0, 0.25, L) -> 7, 8,
        5 => leaf(2.0),
        6 => leaf(3.0),
        7 => leaf(4.0),
        8 => leaf(5.0),
    }
}

/// Shares the root split and its left subtree's first split with `tree_a`.
fn tree_b() -> Tree {
    tree! {
        0 => num(0, 0.5, L) -> 1, 2,
        1 => num(2, 1.0, R) -> 3, 4,
        2 => num(2, -1.0, R) -> 5, 6,
        3 => leaf(1.0),
        4 => leaf(1.5),
        5 => leaf(2.0),
        6 => leaf(3.0),
    }
}

fn set(depth: u32, trees: Vec<Tree>) -> TreeSet {
    let mut set = TreeSet::new(depth);
    for tree in trees {
        set.push_tree(tree, 0);
    }
    set
}

fn sets() -> Vec<TreeSet> {
    vec![set(2, vec![tree_b(), tree_b()]), set(3, vec![tree_a(), tree_b()])]
}

#[rstest]
#[case(1, 1)]
#[case(1, 3)]
#[case(2, 3)]
#[case(3, 3)]
#[case(2, 10)]
fn rule_lengths_stay_in_range(#[case] min: u32, #[case] max: u32) {
    let ensemble = PathExtractor::new(min, max)
        .extract(&sets(), &schema(), Parallelism::Sequential)
        .unwrap();
    assert!(!ensemble.is_empty());
    for rule in &ensemble {
        let len = rule.length() as u32;
        assert!((min..=max).contains(&len), "rule {} has length {len}", rule.name());
    }
}

#[test]
fn extraction_is_idempotent() {
    let extractor = PathExtractor::new(1, 3);
    let first = extractor.extract(&sets(), &schema(), Parallelism::Sequential).unwrap();
    let second = extractor.extract(&sets(), &schema(), Parallelism::Parallel).unwrap();
    assert_eq!(first.len(), second.len());
    let sigs = |e: &rulefit::RuleEnsemble| e.iter().map(|r| r.signature()).collect::<Vec<_>>();
    assert_eq!(sigs(&first), sigs(&second));
    assert_eq!(first, second);
}

#[test]
fn identical_paths_collapse_to_first_seen() {
    let ensemble = PathExtractor::new(1, 2)
        .extract(&sets(), &schema(), Parallelism::Parallel)
        .unwrap();
    // tree_b has 6 non-root nodes; tree_a only adds its categorical leaves
    // (5, 6) and node 4's children are too deep.
    assert_eq!(ensemble.len(), 8);
    let names: Vec<String> = ensemble.iter().map(|r| r.name()).collect();
    assert_eq!(&names[..6], &["M2T0N1", "M2T0N3", "M2T0N4", "M2T0N2", "M2T0N5", "M2T0N6"]);
    assert_eq!(&names[6..], &["M3T0N5", "M3T0N6"]);
}

#[test]
fn candidate_limit_is_checked_before_extraction() {
    let extractor = PathExtractor::new(1, 3).with_max_candidates(5);
    let err = extractor
        .extract(&sets(), &schema(), Parallelism::Sequential)
        .unwrap_err();
    assert!(matches!(err, ExtractError::ResourceLimit { limit: 5, .. }));

    let candidates = PathExtractor::new(1, 3).count_candidates(&sets());
    assert_eq!(candidates, 6 + 6 + 8 + 6);
}

#[test]
fn categorical_split_on_numeric_feature_is_invalid() {
    let bad = tree! {
        0 => cat(0, [1], L) -> 1, 2,
        1 => leaf(0.0),
        2 => leaf(1.0),
    };
    let err = PathExtractor::new(1, 1)
        .extract(&[set(1, vec![bad])], &schema(), Parallelism::Sequential)
        .unwrap_err();
    assert!(matches!(err, ExtractError::InvalidTree { depth: 1, tree: 0, .. }));
}
