//! Scoring: schema adaptation, purity of the transform, metric reproduction.

use approx::assert_relative_eq;
use rulefit::data::Column;
use rulefit::model::{ModelType, RuleFitParams};
use rulefit::testing::{binomial_frame, multinomial_frame, regression_frame};
use rulefit::{Frame, RuleFitError, RuleFitModel};

fn params(model_type: ModelType) -> RuleFitParams {
    RuleFitParams::builder()
        .response_column("y")
        .model_type(model_type)
        .min_rule_length(1)
        .max_rule_length(3)
        .rule_generation_ntrees(6)
        .max_num_rules(15)
        .build()
        .unwrap()
}

/// Same rows with the columns in reverse order.
fn reversed(frame: &Frame) -> Frame {
    let columns: Vec<Column> = frame.columns().iter().rev().cloned().collect();
    Frame::new(frame.id(), columns).unwrap()
}

#[test]
fn scoring_the_training_frame_reproduces_training_metrics() {
    let frame = binomial_frame(400, 21);
    let model = RuleFitModel::train(&frame, params(ModelType::RulesAndLinear)).unwrap();
    assert!(model.linear_model().coefficients().n_nonzero() > 0);
    let scored = model.score(&frame, true).unwrap().metrics.unwrap();
    let trained = model.training_metrics();

    assert_eq!(scored.model_id, trained.model_id);
    assert_eq!(scored.frame_id, trained.frame_id);
    assert_eq!(scored.n_obs, trained.n_obs);
    assert_relative_eq!(scored.deviance, trained.deviance, max_relative = 1e-9);
    assert_relative_eq!(scored.logloss().unwrap(), trained.logloss().unwrap(), max_relative = 1e-9);
    assert_relative_eq!(scored.auc().unwrap(), trained.auc().unwrap(), max_relative = 1e-9);
}

#[test]
fn regression_metrics_are_reproduced() {
    let frame = regression_frame(300, 4);
    let model = RuleFitModel::train(&frame, params(ModelType::RulesAndLinear)).unwrap();
    let scored = model.score(&frame, true).unwrap().metrics.unwrap();
    assert_relative_eq!(scored.mse(), model.training_metrics().mse(), max_relative = 1e-9);
    assert_relative_eq!(
        scored.deviance,
        model.linear_model().deviance(),
        max_relative = 1e-6
    );
}

#[test]
fn transform_is_pure_and_ignores_column_order() {
    let frame = regression_frame(150, 6);
    let model = RuleFitModel::train(&frame, params(ModelType::RulesAndLinear)).unwrap();

    let a = model.transform(&frame).unwrap();
    let b = model.transform(&frame).unwrap();
    let c = model.transform(&reversed(&frame)).unwrap();
    let d = model.transform(&frame.without_column("y")).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(a, d);
    assert_eq!(a.ncols(), model.layout().n_columns());

    let x = frame.feature_matrix(model.schema(), &Default::default()).unwrap();
    for (i, row) in a.rows().into_iter().enumerate().take(10) {
        let values: Vec<f32> = row.to_vec();
        let single = model.layout().transform_row(model.ensemble(), &x.row(i).to_vec());
        assert_eq!(values, single);
    }
}

#[test]
fn missing_rule_feature_is_a_schema_error() {
    let frame = regression_frame(200, 9);
    let model = RuleFitModel::train(&frame, params(ModelType::Rules)).unwrap();
    let rule = model.ensemble().get(0).unwrap();
    let feature = rule.conditions()[0].feature() as usize;
    let name = model.schema().name(feature);

    let err = model.score(&frame.without_column(&name), false).unwrap_err();
    assert!(matches!(err, RuleFitError::Schema(_)), "{err}");
}

#[test]
fn unreferenced_missing_column_is_filled() {
    let frame = regression_frame(200, 9);
    let model = RuleFitModel::train(&frame, params(ModelType::Rules)).unwrap();
    let required = model.layout().required_features(model.ensemble());
    let unused = (0..model.schema().n_features()).find(|f| !required.contains(f));

    if let Some(feature) = unused {
        let name = model.schema().name(feature);
        let full = model.score(&frame, false).unwrap();
        let partial = model.score(&frame.without_column(&name), false).unwrap();
        assert_eq!(
            full.predictions.column("predict").unwrap().values(),
            partial.predictions.column("predict").unwrap().values()
        );
    }
}

#[test]
fn column_type_change_is_a_schema_error() {
    let frame = regression_frame(100, 2);
    let model = RuleFitModel::train(&frame, params(ModelType::Linear)).unwrap();
    let codes = vec![0.0; frame.n_rows()];
    let mut changed = frame.without_column("x0");
    changed
        .push_column(Column::categorical("x0", codes, vec!["a".into()]))
        .unwrap();
    assert!(matches!(model.score(&changed, false), Err(RuleFitError::Schema(_))));
}

#[test]
fn classification_prediction_columns() {
    let frame = multinomial_frame(300, 13);
    let model = RuleFitModel::train(&frame, params(ModelType::RulesAndLinear)).unwrap();
    let predictions = model.score(&frame, false).unwrap().predictions;

    assert_eq!(predictions.names(), vec!["predict", "p0", "p1", "p2"]);
    let predict = predictions.column("predict").unwrap();
    assert_eq!(predict.levels().unwrap(), &["a", "b", "c"]);
    for i in 0..predictions.n_rows() {
        let p: Vec<f32> = ["p0", "p1", "p2"]
            .iter()
            .map(|c| predictions.column(c).unwrap().values()[i])
            .collect();
        assert_relative_eq!(p.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        let argmax = (0..3).fold(0, |b, k| if p[k] > p[b] { k } else { b });
        assert_eq!(predict.values()[i] as usize, argmax);
    }
}

#[test]
fn unseen_levels_follow_the_missing_direction() {
    let frame = binomial_frame(300, 17);
    let model = RuleFitModel::train(&frame, params(ModelType::RulesAndLinear)).unwrap();
    let n = frame.n_rows();

    let with_color = |color: Column| {
        let mut f = frame.without_column("color");
        f.push_column(color).unwrap();
        f
    };
    let unseen = with_color(Column::categorical("color", vec![0.0; n], vec!["purple".into()]));
    let missing = with_color(Column::categorical("color", vec![f32::NAN; n], vec!["blue".into()]));

    assert_eq!(model.transform(&unseen).unwrap(), model.transform(&missing).unwrap());
}
