//! Rule importance table.
//!
//! One row per nonzero activation column, ranked by standardized importance
//! `|coefficient| * std(column)` (maximum over classes for multinomial).

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::linear::LinearModel;
use crate::data::FrameSchema;
use crate::rules::{ActivationLayout, RuleEnsemble};

/// One row of the importance table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleImportance {
    /// Activation column name (`M3T0N7`, `linear.age`, ...).
    pub variable: String,
    pub description: String,
    /// One coefficient per output.
    pub coefficients: Vec<f64>,
    /// Weighted fraction of training rows where the column is nonzero.
    pub support: f64,
    pub importance: f64,
}

/// Build the importance table from the training activation matrix.
pub fn importance_table(
    model: &LinearModel,
    layout: &ActivationLayout,
    ensemble: &RuleEnsemble,
    schema: &FrameSchema,
    activation: ArrayView2<'_, f32>,
    weights: &[f64],
) -> Vec<RuleImportance> {
    let mut rows: Vec<RuleImportance> = model
        .coefficients()
        .entries()
        .iter()
        .map(|entry| {
            let column = activation.column(entry.column);
            let (support, std) = support_and_std(column, weights);
            let max_abs = entry.values.iter().fold(0.0f64, |m, c| m.max(c.abs()));
            RuleImportance {
                variable: layout.names()[entry.column].clone(),
                description: layout.describe(entry.column, ensemble, schema),
                coefficients: entry.values.clone(),
                support,
                importance: max_abs * std,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    rows
}

fn support_and_std(column: ArrayView1<'_, f32>, weights: &[f64]) -> (f64, f64) {
    let mut sum_w = 0.0;
    let mut nonzero_w = 0.0;
    let mut sum = 0.0;
    for (&v, &w) in column.iter().zip(weights) {
        sum_w += w;
        sum += w * v as f64;
        if v != 0.0 {
            nonzero_w += w;
        }
    }
    if sum_w <= 0.0 {
        return (0.0, 0.0);
    }
    let mean = sum / sum_w;
    let var = column
        .iter()
        .zip(weights)
        .map(|(&v, &w)| w * (v as f64 - mean).powi(2))
        .sum::<f64>()
        / sum_w;
    (nonzero_w / sum_w, var.sqrt())
}
