//! Training behavior and invariants.

use rstest::rstest;
use rulefit::model::{Algorithm, ModelType, RuleFitParams};
use rulefit::testing::{binomial_frame, multinomial_frame, regression_frame};
use rulefit::training::MetricsKind;
use rulefit::{CancellationToken, Family, FitWarning, RuleFitError, RuleFitModel, RuleFitTrainer};

use super::common::{init_logging, nonzero_columns, rule_lengths};

#[test]
fn binomial_rules_and_linear_with_length_two_to_three() {
    init_logging();
    let frame = binomial_frame(500, 11);
    let params = RuleFitParams::builder()
        .response_column("y")
        .min_rule_length(2)
        .max_rule_length(3)
        .rule_generation_ntrees(10)
        .model_type(ModelType::RulesAndLinear)
        .max_num_rules(30)
        .build()
        .unwrap();
    let model = RuleFitModel::train(&frame, params).unwrap();

    assert_eq!(model.family(), Family::Binomial);
    assert!(model.warnings().is_empty());
    assert!(rule_lengths(&model).iter().all(|&l| l == 2 || l == 3));

    let layout = model.layout();
    let nonzero = nonzero_columns(&model);
    assert!(nonzero.len() <= 30);
    assert!(nonzero.iter().any(|&c| layout.is_rule_column(c)), "no rule selected");
    assert!(nonzero.iter().any(|&c| !layout.is_rule_column(c)), "no linear term selected");

    let MetricsKind::Binomial { auc, .. } = model.training_metrics().kind else {
        panic!("expected binomial metrics");
    };
    assert!(auc > 0.8, "auc {auc}");
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(5)]
#[case(12)]
fn explicit_rule_count_bounds_nonzero_coefficients(#[case] k: usize) {
    let params = RuleFitParams::builder()
        .response_column("y")
        .min_rule_length(1)
        .max_rule_length(3)
        .rule_generation_ntrees(8)
        .max_num_rules(k as i64)
        .n_threads(1)
        .build()
        .unwrap();
    let model = RuleFitModel::train(&regression_frame(300, 5), params).unwrap();

    assert!(model.linear_model().coefficients().n_nonzero() <= k);
    assert!(model.importance().len() <= k);
}

#[test]
fn max_five_rules_gives_at_most_five_importance_rows() {
    let params = RuleFitParams::builder()
        .response_column("y")
        .rule_generation_ntrees(10)
        .max_num_rules(5)
        .build()
        .unwrap();
    let model = RuleFitModel::train(&binomial_frame(400, 2), params).unwrap();

    let importance = model.importance();
    assert!(!importance.is_empty() && importance.len() <= 5);
    assert!(importance.windows(2).all(|w| w[0].importance >= w[1].importance));
    for row in importance {
        assert!((0.0..=1.0).contains(&row.support));
        assert!(!row.description.is_empty());
    }
}

#[test]
fn linear_only_has_no_rule_columns() {
    let params = RuleFitParams::builder()
        .response_column("y")
        .model_type(ModelType::Linear)
        .build()
        .unwrap();
    let model = RuleFitModel::train(&regression_frame(200, 3), params).unwrap();

    assert!(model.ensemble().is_empty());
    assert_eq!(model.layout().n_rule_columns(), 0);
    // x0, x1, noise and one indicator per color
    assert_eq!(model.layout().n_linear_columns(), 6);
    assert!(model.layout().names().iter().all(|n| n.starts_with("linear.")));
}

#[test]
fn rules_only_has_no_linear_columns() {
    let params = RuleFitParams::builder()
        .response_column("y")
        .model_type(ModelType::Rules)
        .min_rule_length(1)
        .max_rule_length(2)
        .rule_generation_ntrees(5)
        .build()
        .unwrap();
    let model = RuleFitModel::train(&regression_frame(200, 3), params).unwrap();

    assert_eq!(model.layout().n_linear_columns(), 0);
    assert_eq!(model.layout().n_rule_columns(), model.ensemble().len());
}

#[rstest]
#[case(Algorithm::Drf)]
#[case(Algorithm::Gbm)]
fn both_tree_algorithms_produce_rules(#[case] algorithm: Algorithm) {
    let params = RuleFitParams::builder()
        .response_column("y")
        .algorithm(algorithm)
        .min_rule_length(1)
        .max_rule_length(2)
        .rule_generation_ntrees(5)
        .build()
        .unwrap();
    let model = RuleFitModel::train(&regression_frame(300, 4), params).unwrap();
    assert!(!model.ensemble().is_empty());

    let MetricsKind::Regression { r2, .. } = model.training_metrics().kind else {
        panic!("expected regression metrics");
    };
    assert!(r2 > 0.6, "r2 {r2}");
}

#[test]
fn multinomial_training() {
    let params = RuleFitParams::builder()
        .response_column("y")
        .min_rule_length(1)
        .max_rule_length(2)
        .rule_generation_ntrees(5)
        .build()
        .unwrap();
    let model = RuleFitModel::train(&multinomial_frame(400, 8), params).unwrap();

    assert_eq!(model.family(), Family::Multinomial { n_classes: 3 });
    assert_eq!(model.response_levels().unwrap(), &["a", "b", "c"]);
    assert_eq!(model.linear_model().intercepts().len(), 3);
    for row in model.importance() {
        assert_eq!(row.coefficients.len(), 3);
    }
}

#[test]
fn candidate_limit_aborts_training() {
    let params = RuleFitParams::builder()
        .response_column("y")
        .rule_generation_ntrees(5)
        .max_candidate_rules(3)
        .build()
        .unwrap();
    let err = RuleFitModel::train(&regression_frame(200, 1), params).unwrap_err();
    assert!(matches!(err, RuleFitError::ResourceLimit { limit: 3, .. }), "{err}");
}

#[test]
fn cancelled_run_names_the_stage() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let params = RuleFitParams::builder()
        .response_column("y")
        .min_rule_length(2)
        .max_rule_length(2)
        .build()
        .unwrap();
    let err = RuleFitTrainer::new(params)
        .with_cancellation(cancel)
        .fit(&regression_frame(100, 1))
        .unwrap_err();
    match err {
        RuleFitError::Cancelled { stage } => assert_eq!(stage, "tree training (depth 2)"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_response_is_rejected() {
    let params = RuleFitParams::builder().response_column("target").build().unwrap();
    let err = RuleFitModel::train(&regression_frame(50, 1), params).unwrap_err();
    assert!(matches!(err, RuleFitError::MissingResponse(ref c) if c == "target"));
}

#[test]
fn incompatible_family_is_rejected() {
    let params = RuleFitParams::builder()
        .response_column("y")
        .family(rulefit::FamilyKind::Regression)
        .build()
        .unwrap();
    let err = RuleFitModel::train(&binomial_frame(50, 1), params).unwrap_err();
    assert!(matches!(err, RuleFitError::FamilyMismatch { .. }));
}

#[test]
fn unconverged_solver_falls_back_to_intercept_only() {
    use rulefit::training::{LinearProblem, PathSolver, RegularizationPath, SolverError};

    struct NeverConverges;

    impl PathSolver for NeverConverges {
        fn fit_path(
            &self,
            problem: &LinearProblem<'_>,
            cancel: &CancellationToken,
        ) -> Result<RegularizationPath, SolverError> {
            let mut path = rulefit::training::CoordinateDescentSolver::default().fit_path(problem, cancel)?;
            path.points.iter_mut().for_each(|p| p.converged = false);
            Ok(path)
        }
    }

    let params = RuleFitParams::builder()
        .response_column("y")
        .min_rule_length(1)
        .max_rule_length(1)
        .rule_generation_ntrees(3)
        .build()
        .unwrap();
    let model = RuleFitTrainer::new(params)
        .with_solver(NeverConverges)
        .fit(&regression_frame(100, 1))
        .unwrap();

    assert!(matches!(model.warnings(), [FitWarning::SolverDidNotConverge { .. }]));
    assert_eq!(model.linear_model().coefficients().n_nonzero(), 0);
    assert!(model.importance().is_empty());
}
