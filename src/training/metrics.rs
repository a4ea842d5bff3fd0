//! Model quality metrics.
//!
//! [`MetricBuilder`] computes the family-appropriate metrics from
//! response-scale predictions, the encoded response and sample weights.
//! Rows whose response is missing are skipped.
//!
//! # Available Metrics
//!
//! ## Regression
//! - MSE, RMSE, MAE, R², mean residual deviance
//!
//! ## Binomial
//! - Log loss, AUC, MSE (on the class-1 probability), accuracy at 0.5
//!
//! ## Multinomial
//! - Log loss, MSE (`(1 - p_true)²`), classification error

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::family::Family;

/// Family-specific metric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricsKind {
    Regression {
        mse: f64,
        rmse: f64,
        mae: f64,
        r2: f64,
        mean_residual_deviance: f64,
    },
    Binomial {
        logloss: f64,
        auc: f64,
        mse: f64,
        accuracy: f64,
    },
    Multinomial {
        logloss: f64,
        mse: f64,
        error: f64,
    },
}

/// Metrics of one model on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub model_id: String,
    pub frame_id: String,
    /// Rows with a non-missing response.
    pub n_obs: usize,
    pub weight_sum: f64,
    /// Total weighted deviance.
    pub deviance: f64,
    pub kind: MetricsKind,
}

impl ModelMetrics {
    /// Deep copy stamped with a different model and frame identity.
    pub fn clone_for(&self, model_id: impl Into<String>, frame_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            frame_id: frame_id.into(),
            ..self.clone()
        }
    }

    pub fn mse(&self) -> f64 {
        match self.kind {
            MetricsKind::Regression { mse, .. }
            | MetricsKind::Binomial { mse, .. }
            | MetricsKind::Multinomial { mse, .. } => mse,
        }
    }

    /// Log loss for classification metrics.
    pub fn logloss(&self) -> Option<f64> {
        match self.kind {
            MetricsKind::Binomial { logloss, .. } | MetricsKind::Multinomial { logloss, .. } => {
                Some(logloss)
            }
            MetricsKind::Regression { .. } => None,
        }
    }

    pub fn auc(&self) -> Option<f64> {
        match self.kind {
            MetricsKind::Binomial { auc, .. } => Some(auc),
            _ => None,
        }
    }

    /// Deviance per unit weight.
    pub fn mean_deviance(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.deviance / self.weight_sum
        } else {
            0.0
        }
    }
}

/// Computes [`ModelMetrics`] for one response family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricBuilder {
    family: Family,
}

impl MetricBuilder {
    pub fn for_family(family: Family) -> Self {
        Self { family }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Compute metrics.
    ///
    /// `predictions` has one row per sample and
    /// [`Family::n_response_columns`] columns. The returned metrics carry
    /// empty identities; stamp them with [`ModelMetrics::clone_for`].
    pub fn compute(&self, predictions: ArrayView2<'_, f64>, y: &[f64], weights: &[f64]) -> ModelMetrics {
        debug_assert_eq!(predictions.nrows(), y.len());
        debug_assert_eq!(predictions.ncols(), self.family.n_response_columns());

        let mut n_obs = 0usize;
        let mut weight_sum = 0.0;
        let mut deviance = 0.0;
        let mut sq_err = 0.0;
        let mut abs_err = 0.0;
        let mut correct = 0.0;
        let mut row = vec![0.0; predictions.ncols()];

        for (i, (&yi, &wi)) in y.iter().zip(weights).enumerate() {
            if yi.is_nan() {
                continue;
            }
            row.iter_mut()
                .zip(predictions.row(i))
                .for_each(|(r, &p)| *r = p);
            n_obs += 1;
            weight_sum += wi;
            deviance += wi * self.family.unit_deviance(&row, yi);
            match self.family {
                Family::Regression => {
                    let err = yi - row[0];
                    sq_err += wi * err * err;
                    abs_err += wi * err.abs();
                }
                Family::Binomial | Family::Multinomial { .. } => {
                    let p_true = row.get(yi as usize).copied().unwrap_or(0.0);
                    sq_err += wi * (1.0 - p_true) * (1.0 - p_true);
                    if predicted_class(self.family, &row) == yi as usize {
                        correct += wi;
                    }
                }
            }
        }

        let mean = |v: f64| if weight_sum > 0.0 { v / weight_sum } else { 0.0 };
        let kind = match self.family {
            Family::Regression => {
                let mse = mean(sq_err);
                let (y_sum, _) = weighted_valid(y, weights);
                let y_mean = mean(y_sum);
                let ss_tot: f64 = y
                    .iter()
                    .zip(weights)
                    .filter(|(v, _)| !v.is_nan())
                    .map(|(&v, &w)| w * (v - y_mean) * (v - y_mean))
                    .sum();
                let r2 = if ss_tot > 0.0 { 1.0 - sq_err / ss_tot } else { 0.0 };
                MetricsKind::Regression {
                    mse,
                    rmse: mse.sqrt(),
                    mae: mean(abs_err),
                    r2,
                    mean_residual_deviance: mean(deviance),
                }
            }
            Family::Binomial => {
                let scores: Vec<f64> = predictions.column(1).to_vec();
                MetricsKind::Binomial {
                    logloss: mean(deviance) / 2.0,
                    auc: weighted_auc(&scores, y, weights),
                    mse: mean(sq_err),
                    accuracy: mean(correct),
                }
            }
            Family::Multinomial { .. } => MetricsKind::Multinomial {
                logloss: mean(deviance) / 2.0,
                mse: mean(sq_err),
                error: 1.0 - mean(correct),
            },
        };

        ModelMetrics {
            model_id: String::new(),
            frame_id: String::new(),
            n_obs,
            weight_sum,
            deviance,
            kind,
        }
    }
}

/// Predicted class from class probabilities: `p1 >= 0.5` for binomial,
/// argmax otherwise.
pub(crate) fn predicted_class(family: Family, probabilities: &[f64]) -> usize {
    match family {
        Family::Binomial => usize::from(probabilities[1] >= 0.5),
        _ => argmax(probabilities),
    }
}

/// Index of the largest value; ties resolve to the lowest index.
fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv { (i, v) } else { (bi, bv) }
        })
        .0
}

fn weighted_valid(y: &[f64], weights: &[f64]) -> (f64, f64) {
    y.iter()
        .zip(weights)
        .filter(|(v, _)| !v.is_nan())
        .fold((0.0, 0.0), |(s, sw), (&v, &w)| (s + w * v, sw + w))
}

/// Weighted AUC with tied scores counted as half-concordant.
fn weighted_auc(scores: &[f64], labels: &[f64], weights: &[f64]) -> f64 {
    let mut indices: Vec<usize> = (0..scores.len()).filter(|&i| !labels[i].is_nan()).collect();
    indices.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let (sum_pos, sum_neg) = indices.iter().fold((0.0, 0.0), |(sp, sn), &i| {
        if labels[i] > 0.5 {
            (sp + weights[i], sn)
        } else {
            (sp, sn + weights[i])
        }
    });
    if sum_pos == 0.0 || sum_neg == 0.0 {
        return 0.5;
    }

    let mut concordant = 0.0;
    let mut cumulative_neg = 0.0;
    let mut i = 0;
    while i < indices.len() {
        let mut j = i + 1;
        while j < indices.len() && scores[indices[j]] == scores[indices[i]] {
            j += 1;
        }
        let (group_pos, group_neg) = indices[i..j].iter().fold((0.0, 0.0), |(gp, gn), &idx| {
            if labels[idx] > 0.5 {
                (gp + weights[idx], gn)
            } else {
                (gp, gn + weights[idx])
            }
        });
        concordant += group_pos * (cumulative_neg + 0.5 * group_neg);
        cumulative_neg += group_neg;
        i = j;
    }

    concordant / (sum_pos * sum_neg)
}
