//! Response families.
//!
//! A [`Family`] ties together everything that depends on the response type:
//! the number of model outputs, the link function, the deviance and the
//! per-row gradients used by the boosting trainer.
//!
//! Responses are encoded as `f64`: raw values for regression, class codes
//! (`0.0 .. n_classes - 1`) for classification. `NaN` marks a missing response.

use serde::{Deserialize, Serialize};

use super::metrics::MetricBuilder;

/// Smallest probability used inside logarithms.
pub(crate) const PROB_EPS: f64 = 1e-15;

/// Requested family, as given in training parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FamilyKind {
    Regression,
    Binomial,
    Multinomial,
}

/// Response family of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    /// Gaussian response, identity link.
    Regression,
    /// Two classes, logit link. One output: the log-odds of class 1.
    Binomial,
    /// `n_classes` classes, softmax link. One output per class.
    Multinomial { n_classes: usize },
}

impl Family {
    pub fn kind(self) -> FamilyKind {
        match self {
            Family::Regression => FamilyKind::Regression,
            Family::Binomial => FamilyKind::Binomial,
            Family::Multinomial { .. } => FamilyKind::Multinomial,
        }
    }

    /// Number of linear-predictor outputs.
    #[inline]
    pub fn n_outputs(self) -> usize {
        match self {
            Family::Regression | Family::Binomial => 1,
            Family::Multinomial { n_classes } => n_classes,
        }
    }

    /// Number of classes, `None` for regression.
    #[inline]
    pub fn n_classes(self) -> Option<usize> {
        match self {
            Family::Regression => None,
            Family::Binomial => Some(2),
            Family::Multinomial { n_classes } => Some(n_classes),
        }
    }

    #[inline]
    pub fn is_classification(self) -> bool {
        !matches!(self, Family::Regression)
    }

    /// Number of response-scale prediction columns (values or class probabilities).
    #[inline]
    pub fn n_response_columns(self) -> usize {
        self.n_classes().unwrap_or(1)
    }

    /// Intercepts of the intercept-only model.
    pub fn null_intercepts(self, y: &[f64], weights: &[f64]) -> Vec<f64> {
        match self {
            Family::Regression => {
                let (sum, sum_w) = weighted_sums(y, weights, |v| v);
                vec![if sum_w > 0.0 { sum / sum_w } else { 0.0 }]
            }
            Family::Binomial => {
                let (sum, sum_w) = weighted_sums(y, weights, |v| v);
                let p = if sum_w > 0.0 { sum / sum_w } else { 0.5 };
                let p = p.clamp(1e-10, 1.0 - 1e-10);
                vec![(p / (1.0 - p)).ln()]
            }
            Family::Multinomial { n_classes } => {
                let mut counts = vec![0.0; n_classes];
                let mut total = 0.0;
                for (&v, &w) in y.iter().zip(weights) {
                    if v.is_nan() {
                        continue;
                    }
                    if let Some(c) = counts.get_mut(v as usize) {
                        *c += w;
                        total += w;
                    }
                }
                let logs: Vec<f64> = counts
                    .iter()
                    .map(|&c| (if total > 0.0 { c / total } else { 1.0 / n_classes as f64 }).max(1e-10).ln())
                    .collect();
                let mean = logs.iter().sum::<f64>() / n_classes as f64;
                logs.into_iter().map(|l| l - mean).collect()
            }
        }
    }

    /// Map one row of linear predictors to response scale.
    ///
    /// Writes `n_response_columns()` values into `out`: the fitted value for
    /// regression, class probabilities otherwise.
    pub fn link_inverse(self, eta: &[f64], out: &mut [f64]) {
        match self {
            Family::Regression => out[0] = eta[0],
            Family::Binomial => {
                let p1 = sigmoid(eta[0]);
                out[0] = 1.0 - p1;
                out[1] = p1;
            }
            Family::Multinomial { .. } => softmax(eta, out),
        }
    }

    /// Deviance contribution of one row given its response-scale predictions.
    #[inline]
    pub fn unit_deviance(self, response: &[f64], y: f64) -> f64 {
        match self {
            Family::Regression => {
                let r = y - response[0];
                r * r
            }
            Family::Binomial | Family::Multinomial { .. } => {
                let p = response.get(y as usize).copied().unwrap_or(0.0);
                -2.0 * p.max(PROB_EPS).ln()
            }
        }
    }

    /// Weighted deviance of linear predictors `eta` (row-major, `n_outputs` per row).
    /// Rows with a missing response are skipped.
    pub fn deviance(self, eta: &[f64], y: &[f64], weights: &[f64]) -> f64 {
        let k = self.n_outputs();
        let mut response = vec![0.0; self.n_response_columns()];
        let mut dev = 0.0;
        for (i, (&yi, &wi)) in y.iter().zip(weights).enumerate() {
            if yi.is_nan() || wi == 0.0 {
                continue;
            }
            self.link_inverse(&eta[i * k..(i + 1) * k], &mut response);
            dev += wi * self.unit_deviance(&response, yi);
        }
        dev
    }

    /// First and second derivatives of the unit loss w.r.t. each output.
    ///
    /// `out[k] = (gradient, hessian)` for output `k`.
    pub fn gradient_hessian(self, eta: &[f64], y: f64, out: &mut [(f64, f64)]) {
        match self {
            Family::Regression => out[0] = (eta[0] - y, 1.0),
            Family::Binomial => {
                let p = sigmoid(eta[0]);
                out[0] = (p - y, (p * (1.0 - p)).max(1e-6));
            }
            Family::Multinomial { n_classes } => {
                let mut p = vec![0.0; n_classes];
                softmax(eta, &mut p);
                let target = y as usize;
                for (k, (o, &pk)) in out.iter_mut().zip(&p).enumerate() {
                    let indicator = if k == target { 1.0 } else { 0.0 };
                    *o = (pk - indicator, (pk * (1.0 - pk)).max(1e-6));
                }
            }
        }
    }

    /// Metric builder for this family.
    pub fn metric_builder(self) -> MetricBuilder {
        MetricBuilder::for_family(self)
    }
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn softmax(eta: &[f64], out: &mut [f64]) {
    let max = eta.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for (o, &e) in out.iter_mut().zip(eta) {
        *o = (e - max).exp();
        sum += *o;
    }
    for o in out.iter_mut() {
        *o /= sum;
    }
}

fn weighted_sums(y: &[f64], weights: &[f64], f: impl Fn(f64) -> f64) -> (f64, f64) {
    y.iter()
        .zip(weights)
        .filter(|(v, _)| !v.is_nan())
        .fold((0.0, 0.0), |(s, sw), (&v, &w)| (s + w * f(v), sw + w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn null_intercepts_match_means() {
        let y = [1.0, 2.0, 3.0, f64::NAN];
        let w = [1.0, 1.0, 2.0, 5.0];
        assert_relative_eq!(Family::Regression.null_intercepts(&y, &w)[0], 2.25);

        let y = [0.0, 1.0, 1.0, 1.0];
        let w = [1.0; 4];
        assert_relative_eq!(Family::Binomial.null_intercepts(&y, &w)[0], 3.0f64.ln());
    }

    #[test]
    fn multinomial_null_intercepts_reproduce_class_frequencies() {
        let family = Family::Multinomial { n_classes: 3 };
        let y = [0.0, 1.0, 1.0, 2.0];
        let w = [1.0; 4];
        let eta = family.null_intercepts(&y, &w);
        let mut p = [0.0; 3];
        family.link_inverse(&eta, &mut p);
        assert_relative_eq!(p[0], 0.25, epsilon = 1e-9);
        assert_relative_eq!(p[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(p[2], 0.25, epsilon = 1e-9);
    }

    #[test]
    fn binomial_deviance() {
        // eta = 0 => p = 0.5 for every row
        let dev = Family::Binomial.deviance(&[0.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]);
        assert_relative_eq!(dev, -4.0 * 0.5f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn regression_gradients() {
        let mut out = [(0.0, 0.0)];
        Family::Regression.gradient_hessian(&[2.0], 3.0, &mut out);
        assert_eq!(out[0], (-1.0, 1.0));
    }

    #[test]
    fn multinomial_gradients_sum_to_zero() {
        let family = Family::Multinomial { n_classes: 3 };
        let mut out = [(0.0, 0.0); 3];
        family.gradient_hessian(&[0.1, -0.3, 0.7], 1.0, &mut out);
        let sum: f64 = out.iter().map(|(g, _)| g).sum();
        assert_relative_eq!(sum, 0.0, epsilon = 1e-12);
        assert!(out[1].0 < 0.0);
    }
}
