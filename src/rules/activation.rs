//! Activation columns: the fixed-width representation the linear model sees.
//!
//! Column order is rule indicators (ensemble order) followed, when linear
//! terms are included, by the original features in schema order:
//! - a numeric feature gives `linear.<name>`, missing values replaced by the
//!   training mean;
//! - a categorical feature gives one indicator `linear.<name>.<level>` per
//!   training level (all zero when missing).
//!
//! The layout is derived once at training time and persisted; `transform` is
//! a pure function of the layout, the ensemble and the row.

use std::collections::BTreeSet;

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};

use super::ensemble::RuleEnsemble;
use crate::data::{FeatureType, FrameSchema};
use crate::model::ModelType;
use crate::repr::float_to_category;
use crate::utils::Parallelism;

/// Prefix of linear-term column names.
pub const LINEAR_PREFIX: &str = "linear.";

/// What one activation column holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivationColumn {
    /// 1 when ensemble rule `index` fires.
    Rule { index: usize },
    /// Raw numeric feature, missing imputed with `mean`.
    Numeric { feature: usize, mean: f32 },
    /// 1 when categorical `feature` takes `level`.
    Level { feature: usize, level: u32 },
}

/// Ordered activation columns with their names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationLayout {
    model_type: ModelType,
    columns: Vec<ActivationColumn>,
    names: Vec<String>,
    n_rules: usize,
}

impl ActivationLayout {
    /// Derive the layout from the ensemble, model type and training data.
    ///
    /// `x` is the training feature matrix laid out by `schema`; it only
    /// supplies the imputation means of numeric linear terms.
    pub fn build(
        ensemble: &RuleEnsemble,
        model_type: ModelType,
        schema: &FrameSchema,
        x: ArrayView2<'_, f32>,
        weights: &[f64],
    ) -> Self {
        let mut columns = Vec::new();
        let mut names = Vec::new();

        if model_type.has_rules() {
            for (index, rule) in ensemble.iter().enumerate() {
                columns.push(ActivationColumn::Rule { index });
                names.push(rule.name());
            }
        }
        let n_rules = columns.len();

        if model_type.has_linear() {
            for (feature, meta) in schema.iter().enumerate() {
                match &meta.feature_type {
                    FeatureType::Numeric => {
                        let mean = weighted_mean(x.column(feature), weights);
                        columns.push(ActivationColumn::Numeric { feature, mean });
                        names.push(format!("{LINEAR_PREFIX}{}", meta.name));
                    }
                    FeatureType::Categorical { levels } => {
                        for (level, level_name) in levels.iter().enumerate() {
                            columns.push(ActivationColumn::Level {
                                feature,
                                level: level as u32,
                            });
                            names.push(format!("{LINEAR_PREFIX}{}.{level_name}", meta.name));
                        }
                    }
                }
            }
        }

        Self {
            model_type,
            columns,
            names,
            n_rules,
        }
    }

    #[inline]
    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    #[inline]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn n_rule_columns(&self) -> usize {
        self.n_rules
    }

    #[inline]
    pub fn n_linear_columns(&self) -> usize {
        self.columns.len() - self.n_rules
    }

    pub fn columns(&self) -> &[ActivationColumn] {
        &self.columns
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn is_rule_column(&self, column: usize) -> bool {
        column < self.n_rules
    }

    /// Human-readable description of a column.
    pub fn describe(&self, column: usize, ensemble: &RuleEnsemble, schema: &FrameSchema) -> String {
        match &self.columns[column] {
            ActivationColumn::Rule { index } => ensemble
                .get(*index)
                .map_or_else(String::new, |rule| rule.describe(schema)),
            ActivationColumn::Numeric { feature, .. } => schema.name(*feature),
            ActivationColumn::Level { feature, level } => {
                let level_name = schema
                    .get(*feature)
                    .and_then(|m| m.level_name(*level))
                    .map_or_else(|| level.to_string(), str::to_owned);
                format!("{} is {level_name}", schema.name(*feature))
            }
        }
    }

    /// Schema features that must be present to compute every column.
    pub fn required_features(&self, ensemble: &RuleEnsemble) -> BTreeSet<usize> {
        let mut required = if self.n_rules > 0 {
            ensemble.referenced_features()
        } else {
            BTreeSet::new()
        };
        for column in &self.columns[self.n_rules..] {
            match *column {
                ActivationColumn::Numeric { feature, .. } | ActivationColumn::Level { feature, .. } => {
                    required.insert(feature);
                }
                ActivationColumn::Rule { .. } => {}
            }
        }
        required
    }

    /// Activation matrix for a feature matrix laid out by the training schema.
    ///
    /// Rows are independent and are processed in parallel when allowed.
    pub fn transform(
        &self,
        ensemble: &RuleEnsemble,
        x: ArrayView2<'_, f32>,
        parallelism: Parallelism,
    ) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((x.nrows(), self.n_columns()));
        let fill = |out_row: ArrayViewMut1<'_, f32>, row: ArrayView1<'_, f32>| {
            let owned;
            let row = match row.as_slice() {
                Some(slice) => slice,
                None => {
                    owned = row.to_vec();
                    &owned
                }
            };
            self.fill_row(ensemble, row, out_row);
        };

        let zip = Zip::from(out.rows_mut()).and(x.rows());
        if parallelism.is_parallel() {
            zip.par_for_each(fill);
        } else {
            zip.for_each(fill);
        }
        out
    }

    /// Activation vector of a single row.
    pub fn transform_row(&self, ensemble: &RuleEnsemble, row: &[f32]) -> Vec<f32> {
        let mut out = ndarray::Array1::<f32>::zeros(self.n_columns());
        self.fill_row(ensemble, row, out.view_mut());
        out.to_vec()
    }

    fn fill_row(&self, ensemble: &RuleEnsemble, row: &[f32], mut out: ArrayViewMut1<'_, f32>) {
        for (j, column) in self.columns.iter().enumerate() {
            out[j] = match *column {
                ActivationColumn::Rule { index } => {
                    let fires = ensemble.get(index).is_some_and(|rule| rule.evaluate(row));
                    f32::from(u8::from(fires))
                }
                ActivationColumn::Numeric { feature, mean } => {
                    let v = row.get(feature).copied().unwrap_or(f32::NAN);
                    if v.is_nan() { mean } else { v }
                }
                ActivationColumn::Level { feature, level } => {
                    let v = row.get(feature).copied().unwrap_or(f32::NAN);
                    let hit = !v.is_nan() && v >= 0.0 && float_to_category(v) == level;
                    f32::from(u8::from(hit))
                }
            };
        }
    }
}

/// Weighted mean of the non-missing values (0 when none).
fn weighted_mean(values: ArrayView1<'_, f32>, weights: &[f64]) -> f32 {
    let (sum, sum_w) = values
        .iter()
        .zip(weights)
        .filter(|(v, _)| !v.is_nan())
        .fold((0.0f64, 0.0f64), |(s, sw), (&v, &w)| (s + w * v as f64, sw + w));
    if sum_w > 0.0 { (sum / sum_w) as f32 } else { 0.0 }
}
