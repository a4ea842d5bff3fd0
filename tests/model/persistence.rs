//! Save/load round trips.

use rulefit::model::RuleFitParams;
use rulefit::testing::{binomial_frame, regression_frame};
use rulefit::{RuleFitError, RuleFitModel};

fn trained(frame: &rulefit::Frame) -> RuleFitModel {
    let params = RuleFitParams::builder()
        .response_column("y")
        .min_rule_length(1)
        .max_rule_length(2)
        .rule_generation_ntrees(5)
        .max_num_rules(10)
        .build()
        .unwrap();
    RuleFitModel::train(frame, params).unwrap()
}

#[test]
fn save_load_preserves_ensemble_order_and_scores() {
    let frame = binomial_frame(300, 31);
    let model = trained(&frame);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    model.save(&path).unwrap();
    let loaded = RuleFitModel::load(&path).unwrap();

    assert_eq!(loaded, model);
    let names = |m: &RuleFitModel| m.ensemble().iter().map(|r| r.name()).collect::<Vec<_>>();
    assert_eq!(names(&loaded), names(&model));

    let before = model.score(&frame, true).unwrap();
    let after = loaded.score(&frame, true).unwrap();
    for column in ["predict", "p0", "p1"] {
        assert_eq!(
            before.predictions.column(column).unwrap().values(),
            after.predictions.column(column).unwrap().values()
        );
    }
    assert_eq!(before.metrics, after.metrics);
}

#[test]
fn json_round_trip_keeps_importance_and_metrics() {
    let model = trained(&regression_frame(200, 32));
    let restored = RuleFitModel::from_json(&model.to_json().unwrap()).unwrap();
    assert_eq!(restored.importance(), model.importance());
    assert_eq!(restored.training_metrics(), model.training_metrics());
    assert_eq!(restored.params(), model.params());
}

#[test]
fn corrupt_file_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"model_id\": 3}").unwrap();
    assert!(matches!(RuleFitModel::load(&path), Err(RuleFitError::Persistence(_))));
    assert!(matches!(
        RuleFitModel::load(dir.path().join("absent.json")),
        Err(RuleFitError::Io(_))
    ));
}
