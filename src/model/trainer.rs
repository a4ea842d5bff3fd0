//! The RuleFit training pipeline.
//!
//! ```text
//! frame ─► schema + feature matrix ─► tree sets (one per depth)
//!       ─► rule ensemble ─► activation matrix ─► lasso path ─► selected model
//! ```
//!
//! Collaborators are pluggable: any [`TreeTrainer`] and [`PathSolver`] can be
//! injected; by default the algorithm named in the parameters and the
//! coordinate-descent solver are used.

use std::collections::BTreeSet;

use ndarray::Axis;

use super::importance::importance_table;
use super::linear::LinearModel;
use super::params::{Algorithm, RuleFitParams};
use super::rulefit::RuleFitModel;
use crate::data::{Column, Frame, FrameError};
use crate::error::{FitWarning, RuleFitError};
use crate::rules::{ActivationLayout, PathExtractor, RuleEnsemble};
use crate::training::{
    CoordinateDescentSolver, Family, FamilyKind, GradientBoostingTrainer, LinearProblem, PathSolver,
    RandomForestTrainer, Selection, TrainingData, TreeTrainer, select,
};
use crate::utils::{CancellationToken, Parallelism, run_with_threads};

// =============================================================================
// RuleFitTrainer
// =============================================================================

/// Trains [`RuleFitModel`]s.
///
/// # Example
///
/// ```no_run
/// use rulefit::model::{RuleFitParams, RuleFitTrainer};
/// # fn run(frame: &rulefit::data::Frame) -> Result<(), rulefit::RuleFitError> {
/// let params = RuleFitParams::builder()
///     .response_column("label")
///     .max_num_rules(10)
///     .build()?;
/// let model = RuleFitTrainer::new(params).fit(frame)?;
/// for row in model.importance() {
///     println!("{} {:.3} {}", row.variable, row.importance, row.description);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RuleFitTrainer {
    params: RuleFitParams,
    tree_trainer: Option<Box<dyn TreeTrainer>>,
    solver: Box<dyn PathSolver>,
    cancel: CancellationToken,
}

impl RuleFitTrainer {
    pub fn new(params: RuleFitParams) -> Self {
        Self {
            params,
            tree_trainer: None,
            solver: Box::new(CoordinateDescentSolver::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a custom tree trainer instead of the one named by `algorithm`.
    pub fn with_tree_trainer(mut self, trainer: impl TreeTrainer + 'static) -> Self {
        self.tree_trainer = Some(Box::new(trainer));
        self
    }

    pub fn with_solver(mut self, solver: impl PathSolver + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    /// Share a cancellation token with the caller.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn params(&self) -> &RuleFitParams {
        &self.params
    }

    /// Train on `frame`.
    ///
    /// # Errors
    ///
    /// Parameter and response validation errors are raised before any work.
    /// Collaborator failures are wrapped with the failing stage.
    pub fn fit(&self, frame: &Frame) -> Result<RuleFitModel, RuleFitError> {
        self.params.validate()?;
        let n_threads = self.params.n_threads.unwrap_or(0);
        run_with_threads(n_threads, |parallelism| self.fit_with(frame, parallelism))?
    }

    fn fit_with(&self, frame: &Frame, parallelism: Parallelism) -> Result<RuleFitModel, RuleFitError> {
        let params = &self.params;
        let model_id = params
            .model_id
            .clone()
            .unwrap_or_else(|| format!("RuleFit_model_{}", frame.id()));

        // Response, weights and the rows that take part in training.
        let response_col = frame
            .column(&params.response_column)
            .ok_or_else(|| RuleFitError::MissingResponse(params.response_column.clone()))?;
        let response = resolve_response(response_col, params.family)?;
        let family = response.family;
        let raw_weights = row_weights(frame, params.weights_column.as_deref())?;

        let keep: Vec<usize> = response
            .values
            .iter()
            .zip(&raw_weights)
            .enumerate()
            .filter(|(_, (y, w))| !y.is_nan() && !w.is_nan())
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(RuleFitError::ResponseType {
                column: params.response_column.clone(),
                reason: "no rows with a non-missing response".into(),
            });
        }
        let y: Vec<f64> = keep.iter().map(|&i| response.values[i]).collect();
        let weights: Vec<f64> = keep.iter().map(|&i| raw_weights[i]).collect();

        let schema = frame.schema_excluding(&params.non_feature_columns());
        let all_features: BTreeSet<usize> = (0..schema.n_features()).collect();
        let x = frame
            .feature_matrix(&schema, &all_features)?
            .select(Axis(0), &keep);

        log::info!(
            "training {}: {} rows ({} dropped), {} features, family {:?}, model type {:?}",
            model_id,
            keep.len(),
            frame.n_rows() - keep.len(),
            schema.n_features(),
            family,
            params.model_type
        );

        // Rule generation.
        let ensemble = if params.model_type.has_rules() {
            let data = TrainingData {
                features: x.view(),
                schema: &schema,
                response: &y,
                weights: &weights,
                parallelism,
            };
            let fallback;
            let trainer: &dyn TreeTrainer = match &self.tree_trainer {
                Some(trainer) => trainer.as_ref(),
                None => {
                    fallback = default_tree_trainer(params);
                    fallback.as_ref()
                }
            };

            let mut sets = Vec::new();
            for depth in params.depths() {
                let stage = format!("tree training (depth {depth})");
                log::info!("{stage}: {} trees with {}", params.rule_generation_ntrees, trainer.name());
                let set = trainer
                    .train(&data, depth, params.rule_generation_ntrees, family, &self.cancel)
                    .map_err(|e| RuleFitError::trainer(stage, e))?;
                sets.push(set);
            }

            PathExtractor::new(params.min_rule_length, params.max_rule_length)
                .with_max_candidates(params.max_candidate_rules)
                .extract(&sets, &schema, parallelism)?
        } else {
            RuleEnsemble::new()
        };
        if self.cancel.is_cancelled() {
            return Err(RuleFitError::Cancelled {
                stage: "rule extraction".into(),
            });
        }

        // Sparse linear fit.
        let layout = ActivationLayout::build(&ensemble, params.model_type, &schema, x.view(), &weights);
        let activation = layout.transform(&ensemble, x.view(), parallelism);
        log::info!(
            "activation matrix: {} rule columns, {} linear columns",
            layout.n_rule_columns(),
            layout.n_linear_columns()
        );

        let mut problem = LinearProblem::new(activation.view(), &y, &weights, family);
        problem.n_lambdas = params.n_lambdas;
        problem.max_active = usize::try_from(params.max_num_rules).ok();
        problem.parallelism = parallelism;
        let path = self
            .solver
            .fit_path(&problem, &self.cancel)
            .map_err(|e| RuleFitError::solver("linear fit", e))?;

        let mut warnings = Vec::new();
        let linear = match select(&path, params.selection_policy()) {
            Selection::Point(i) => {
                let point = &path.points[i];
                log::info!(
                    "selected path point {} of {}: lambda {:.6}, {} nonzero, deviance {:.6}",
                    i + 1,
                    path.points.len(),
                    point.lambda,
                    point.n_nonzero(),
                    point.deviance
                );
                LinearModel::from_path_point(family, point)
            }
            Selection::InterceptOnly => {
                log::info!("no path point within the rule budget; using the intercept-only model");
                LinearModel::intercept_only(
                    family,
                    path.null_intercepts.clone(),
                    layout.n_columns(),
                    path.null_deviance,
                )
            }
            Selection::NotConverged => {
                let warning = FitWarning::SolverDidNotConverge {
                    n_points: path.points.len(),
                };
                log::warn!("{warning}");
                warnings.push(warning);
                LinearModel::intercept_only(
                    family,
                    path.null_intercepts.clone(),
                    layout.n_columns(),
                    path.null_deviance,
                )
            }
        };

        let importance = importance_table(&linear, &layout, &ensemble, &schema, activation.view(), &weights);
        let predictions = linear.predict(activation.view(), parallelism);
        let training_metrics = family
            .metric_builder()
            .compute(predictions.view(), &y, &weights)
            .clone_for(model_id.as_str(), frame.id());

        Ok(RuleFitModel {
            model_id,
            params: params.clone(),
            schema,
            family,
            response_levels: response.levels,
            ensemble,
            layout,
            linear,
            importance,
            training_metrics,
            warnings,
        })
    }
}

fn default_tree_trainer(params: &RuleFitParams) -> Box<dyn TreeTrainer> {
    match params.algorithm.resolve() {
        Algorithm::Gbm => Box::new(GradientBoostingTrainer::new(params.seed)),
        Algorithm::Drf | Algorithm::Auto => Box::new(RandomForestTrainer::new(params.seed)),
    }
}

// =============================================================================
// Response handling
// =============================================================================

/// Family, class levels and encoded values of a training response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedResponse {
    pub family: Family,
    pub levels: Option<Vec<String>>,
    /// Values (regression) or class codes; `NaN` when missing.
    pub values: Vec<f64>,
}

/// Infer or check the family against the response column and encode it.
pub(crate) fn resolve_response(
    column: &Column,
    requested: Option<FamilyKind>,
) -> Result<ResolvedResponse, RuleFitError> {
    let mismatch = |family: FamilyKind, reason: &str| RuleFitError::FamilyMismatch {
        family: format!("{family:?}"),
        column: column.name().to_owned(),
        reason: reason.to_owned(),
    };

    match column.levels() {
        Some(levels) => {
            let n = levels.len();
            if n < 2 {
                return Err(RuleFitError::ResponseType {
                    column: column.name().to_owned(),
                    reason: format!("categorical response needs at least 2 levels, found {n}"),
                });
            }
            let family = match requested {
                None if n == 2 => Family::Binomial,
                None | Some(FamilyKind::Multinomial) => Family::Multinomial { n_classes: n },
                Some(FamilyKind::Binomial) if n == 2 => Family::Binomial,
                Some(kind @ FamilyKind::Binomial) => {
                    return Err(mismatch(kind, "binomial needs exactly 2 levels"));
                }
                Some(kind @ FamilyKind::Regression) => {
                    return Err(mismatch(kind, "regression needs a numeric response"));
                }
            };
            let values = column
                .values()
                .iter()
                .map(|&c| {
                    if c.is_nan() || c < 0.0 || c as usize >= n {
                        f64::NAN
                    } else {
                        c as f64
                    }
                })
                .collect();
            Ok(ResolvedResponse {
                family,
                levels: Some(levels.to_vec()),
                values,
            })
        }
        None => {
            let values: Vec<f64> = column
                .values()
                .iter()
                .map(|&v| if v.is_finite() { v as f64 } else { f64::NAN })
                .collect();
            match requested {
                None | Some(FamilyKind::Regression) => Ok(ResolvedResponse {
                    family: Family::Regression,
                    levels: None,
                    values,
                }),
                Some(kind @ FamilyKind::Binomial) => {
                    if values.iter().any(|&v| !v.is_nan() && v != 0.0 && v != 1.0) {
                        return Err(mismatch(kind, "a numeric binomial response must be 0 or 1"));
                    }
                    Ok(ResolvedResponse {
                        family: Family::Binomial,
                        levels: Some(vec!["0".into(), "1".into()]),
                        values,
                    })
                }
                Some(kind @ FamilyKind::Multinomial) => {
                    Err(mismatch(kind, "multinomial needs a categorical response"))
                }
            }
        }
    }
}

/// Encode a scoring-time response against the training levels.
///
/// Categorical columns are matched by level name; numeric columns against
/// classification levels are matched by the level's numeric value. Anything
/// unmatched is `NaN`.
pub(crate) fn encode_response(column: &Column, levels: Option<&[String]>) -> Result<Vec<f64>, FrameError> {
    match (levels, column.levels()) {
        (None, None) => Ok(column
            .values()
            .iter()
            .map(|&v| if v.is_finite() { v as f64 } else { f64::NAN })
            .collect()),
        (None, Some(_)) => Err(FrameError::TypeMismatch {
            name: column.name().to_owned(),
            expected: "numeric",
            found: "categorical",
        }),
        (Some(levels), Some(found)) => {
            let remap: Vec<f64> = found
                .iter()
                .map(|l| levels.iter().position(|t| t == l).map_or(f64::NAN, |i| i as f64))
                .collect();
            Ok(column
                .values()
                .iter()
                .map(|&c| {
                    if c.is_nan() || c < 0.0 {
                        f64::NAN
                    } else {
                        remap.get(c as usize).copied().unwrap_or(f64::NAN)
                    }
                })
                .collect())
        }
        (Some(levels), None) => {
            let numeric: Vec<Option<f64>> = levels.iter().map(|l| l.parse::<f64>().ok()).collect();
            Ok(column
                .values()
                .iter()
                .map(|&v| {
                    numeric
                        .iter()
                        .position(|&l| l == Some(v as f64))
                        .map_or(f64::NAN, |i| i as f64)
                })
                .collect())
        }
    }
}

/// Per-row weights: the weights column, or 1. Missing weights are `NaN`.
pub(crate) fn row_weights(frame: &Frame, weights_column: Option<&str>) -> Result<Vec<f64>, RuleFitError> {
    let Some(name) = weights_column else {
        return Ok(vec![1.0; frame.n_rows()]);
    };
    let column = frame
        .column(name)
        .ok_or_else(|| FrameError::MissingColumn(name.to_owned()))?;
    if column.is_categorical() {
        return Err(FrameError::TypeMismatch {
            name: name.to_owned(),
            expected: "numeric",
            found: "categorical",
        }
        .into());
    }
    let weights: Vec<f64> = column.values().iter().map(|&w| w as f64).collect();
    if weights.iter().any(|&w| w < 0.0 || w.is_infinite()) {
        return Err(RuleFitError::ResponseType {
            column: name.to_owned(),
            reason: "weights must be finite and non-negative".into(),
        });
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn labels(values: &[&str]) -> Column {
        let labels: Vec<Option<&str>> = values.iter().map(|&v| Some(v)).collect();
        Column::from_labels("y", &labels)
    }

    #[rstest]
    #[case(labels(&["a", "b", "a"]), None, Family::Binomial)]
    #[case(labels(&["a", "b", "c"]), None, Family::Multinomial { n_classes: 3 })]
    #[case(labels(&["a", "b"]), Some(FamilyKind::Multinomial), Family::Multinomial { n_classes: 2 })]
    #[case(Column::numeric("y", vec![0.5, 2.0]), None, Family::Regression)]
    #[case(Column::numeric("y", vec![0.0, 1.0, f32::NAN]), Some(FamilyKind::Binomial), Family::Binomial)]
    fn family_inference(#[case] column: Column, #[case] requested: Option<FamilyKind>, #[case] expected: Family) {
        assert_eq!(resolve_response(&column, requested).unwrap().family, expected);
    }

    #[rstest]
    #[case(labels(&["a", "b", "c"]), Some(FamilyKind::Binomial))]
    #[case(labels(&["a", "b"]), Some(FamilyKind::Regression))]
    #[case(Column::numeric("y", vec![0.0, 2.0]), Some(FamilyKind::Binomial))]
    #[case(Column::numeric("y", vec![0.0, 1.0]), Some(FamilyKind::Multinomial))]
    fn family_mismatch(#[case] column: Column, #[case] requested: Option<FamilyKind>) {
        assert!(matches!(
            resolve_response(&column, requested),
            Err(RuleFitError::FamilyMismatch { .. })
        ));
    }

    #[test]
    fn single_level_response_is_rejected() {
        assert!(matches!(
            resolve_response(&labels(&["a", "a"]), None),
            Err(RuleFitError::ResponseType { .. })
        ));
    }

    #[test]
    fn scoring_response_is_remapped_by_name() {
        let training = vec!["no".to_string(), "yes".to_string()];
        // sorted levels of the scoring column: ["maybe", "yes"]
        let column = Column::from_labels("y", &[Some("yes"), Some("maybe"), None]);
        let y = encode_response(&column, Some(&training)).unwrap();
        assert_eq!(y[0], 1.0);
        assert!(y[1].is_nan());
        assert!(y[2].is_nan());

        let numeric = Column::numeric("y", vec![1.0, 0.0, 3.0]);
        let levels = vec!["0".to_string(), "1".to_string()];
        let y = encode_response(&numeric, Some(&levels)).unwrap();
        assert_eq!(&y[..2], &[1.0, 0.0]);
        assert!(y[2].is_nan());
    }

    #[test]
    fn negative_weights_are_rejected() {
        let frame = Frame::new(
            "f",
            vec![Column::numeric("y", vec![1.0, 2.0]), Column::numeric("w", vec![1.0, -1.0])],
        )
        .unwrap();
        assert!(row_weights(&frame, Some("w")).is_err());
        assert_eq!(row_weights(&frame, None).unwrap(), vec![1.0, 1.0]);
    }
}
