//! The trained RuleFit model: persisted state, transform, scoring and
//! serialization.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::importance::RuleImportance;
use super::linear::LinearModel;
use super::params::RuleFitParams;
use super::trainer::{RuleFitTrainer, encode_response, row_weights};
use crate::data::{Column, Frame, FrameSchema};
use crate::error::{FitWarning, RuleFitError};
use crate::rules::{ActivationLayout, RuleEnsemble};
use crate::training::metrics::predicted_class;
use crate::training::{Family, ModelMetrics};
use crate::utils::Parallelism;

/// Output of [`RuleFitModel::score`].
#[derive(Debug, Clone)]
pub struct ScoreResult {
    /// `predict`, plus `p0..p{K-1}` for classification.
    pub predictions: Frame,
    /// Present when requested and the scored frame carries the response.
    pub metrics: Option<ModelMetrics>,
}

/// A trained RuleFit model.
///
/// Everything scoring needs is fixed at training time; scoring only reads it,
/// so a model can be shared across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFitModel {
    pub(crate) model_id: String,
    pub(crate) params: RuleFitParams,
    /// Feature schema of the training frame.
    pub(crate) schema: FrameSchema,
    pub(crate) family: Family,
    /// Class labels for classification.
    pub(crate) response_levels: Option<Vec<String>>,
    pub(crate) ensemble: RuleEnsemble,
    pub(crate) layout: ActivationLayout,
    pub(crate) linear: LinearModel,
    pub(crate) importance: Vec<RuleImportance>,
    pub(crate) training_metrics: ModelMetrics,
    pub(crate) warnings: Vec<FitWarning>,
}

impl RuleFitModel {
    /// Train with the default collaborators.
    pub fn train(frame: &Frame, params: RuleFitParams) -> Result<Self, RuleFitError> {
        RuleFitTrainer::new(params).fit(frame)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn params(&self) -> &RuleFitParams {
        &self.params
    }

    pub fn schema(&self) -> &FrameSchema {
        &self.schema
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn response_levels(&self) -> Option<&[String]> {
        self.response_levels.as_deref()
    }

    pub fn ensemble(&self) -> &RuleEnsemble {
        &self.ensemble
    }

    pub fn layout(&self) -> &ActivationLayout {
        &self.layout
    }

    pub fn linear_model(&self) -> &LinearModel {
        &self.linear
    }

    /// Rule importance table, most important first.
    pub fn importance(&self) -> &[RuleImportance] {
        &self.importance
    }

    pub fn training_metrics(&self) -> &ModelMetrics {
        &self.training_metrics
    }

    pub fn warnings(&self) -> &[FitWarning] {
        &self.warnings
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Activation matrix of `frame`: rule indicators then linear terms.
    ///
    /// # Errors
    ///
    /// [`RuleFitError::Schema`] when a column needed by a rule or linear term
    /// is absent or its type differs from training.
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f32>, RuleFitError> {
        let required = self.layout.required_features(&self.ensemble);
        let x = frame
            .feature_matrix(&self.schema, &required)
            .map_err(RuleFitError::Schema)?;
        Ok(self.layout.transform(&self.ensemble, x.view(), Parallelism::Parallel))
    }

    /// Predict on `frame`, optionally computing metrics against its response.
    pub fn score(&self, frame: &Frame, compute_metrics: bool) -> Result<ScoreResult, RuleFitError> {
        let activation = self.transform(frame)?;
        let predictions = self.linear.predict(activation.view(), Parallelism::Parallel);
        let metrics = if compute_metrics {
            self.metrics_for(frame, predictions.view())?
        } else {
            None
        };
        Ok(ScoreResult {
            predictions: self.prediction_frame(frame, predictions.view())?,
            metrics,
        })
    }

    fn metrics_for(
        &self,
        frame: &Frame,
        predictions: ArrayView2<'_, f64>,
    ) -> Result<Option<ModelMetrics>, RuleFitError> {
        let Some(column) = frame.column(&self.params.response_column) else {
            log::warn!(
                "frame '{}' has no response column '{}'; metrics skipped",
                frame.id(),
                self.params.response_column
            );
            return Ok(None);
        };
        let mut y = encode_response(column, self.response_levels.as_deref()).map_err(RuleFitError::Schema)?;
        let mut weights = match &self.params.weights_column {
            Some(name) if frame.column(name).is_some() => row_weights(frame, Some(name))?,
            _ => vec![1.0; frame.n_rows()],
        };
        for (yi, wi) in y.iter_mut().zip(weights.iter_mut()) {
            if wi.is_nan() {
                *yi = f64::NAN;
                *wi = 0.0;
            }
        }
        let metrics = self
            .family
            .metric_builder()
            .compute(predictions, &y, &weights)
            .clone_for(self.model_id.as_str(), frame.id());
        Ok(Some(metrics))
    }

    fn prediction_frame(&self, frame: &Frame, predictions: ArrayView2<'_, f64>) -> Result<Frame, RuleFitError> {
        let id = format!("{}_predictions_{}", self.model_id, frame.id());
        let mut columns = Vec::with_capacity(predictions.ncols() + 1);

        match self.family {
            Family::Regression => {
                columns.push(Column::numeric(
                    "predict",
                    predictions.column(0).iter().map(|&v| v as f32).collect(),
                ));
            }
            Family::Binomial | Family::Multinomial { .. } => {
                let labels: Vec<f32> = predictions
                    .rows()
                    .into_iter()
                    .map(|row| predicted_class(self.family, &row.to_vec()) as f32)
                    .collect();
                let levels = self
                    .response_levels
                    .clone()
                    .unwrap_or_else(|| (0..predictions.ncols()).map(|k| k.to_string()).collect());
                columns.push(Column::categorical("predict", labels, levels));
                for (k, p) in predictions.columns().into_iter().enumerate() {
                    columns.push(Column::numeric(format!("p{k}"), p.iter().map(|&v| v as f32).collect()));
                }
            }
        }
        Ok(Frame::new(id, columns)?)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_json(&self) -> Result<String, RuleFitError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, RuleFitError> {
        let model: Self = serde_json::from_str(json)?;
        model.check_consistency()?;
        Ok(model)
    }

    /// Write the model as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RuleFitError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Read a model written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleFitError> {
        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader)?;
        model.check_consistency()?;
        Ok(model)
    }

    /// Cross-check the persisted parts: rule columns against the ensemble,
    /// referenced features against the schema, coefficients against the layout.
    fn check_consistency(&self) -> Result<(), RuleFitError> {
        let inconsistent = RuleFitError::InconsistentModel;
        if self.layout.n_rule_columns() > self.ensemble.len() {
            return Err(inconsistent(format!(
                "{} rule columns for {} rules",
                self.layout.n_rule_columns(),
                self.ensemble.len()
            )));
        }
        let n_features = self.schema.n_features();
        let required = self.layout.required_features(&self.ensemble);
        if let Some(feature) = required.into_iter().find(|&f| f >= n_features) {
            return Err(inconsistent(format!(
                "feature {feature} is not in the {n_features}-feature schema"
            )));
        }
        self.linear.check_shape(self.layout.n_columns()).map_err(inconsistent)
    }
}
