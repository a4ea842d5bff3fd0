//! Elastic-net coordinate descent along a regularization path.
//!
//! Columns are standardized internally (weighted mean and standard deviation)
//! and coefficients are reported on the original scale. Each lambda is warm
//! started from the previous solution. Binomial and multinomial families use
//! an IRLS outer loop; the multinomial case cycles through classes, fitting
//! each class's coefficients against a quadratic approximation.
//!
//! # Coordinate step
//!
//! For working weights `w`, residuals `r` and a standardized column `z`:
//! ```text
//! grad = Σ(w × z × r) + xv × β
//! β'   = soft_threshold(grad, λ × alpha) / (xv + λ × (1 - alpha))
//! ```
//! where `xv = Σ(w × z²)`.
//!
//! # Convergence
//!
//! A fit is converged once the largest `xv × Δβ²` over a sweep (the
//! intercept counts with `Σw`) drops below `tolerance × null deviance`.
//! The IRLS loop applies the same test to the change across one outer
//! iteration, and halves the step while the penalized objective rises.

use ndarray::{Array2, ArrayView2};

use super::{LinearProblem, PathPoint, PathSolver, RegularizationPath, SolverError};
use crate::training::Family;
use crate::training::family::{sigmoid, softmax};
use crate::utils::{CancellationToken, Parallelism};

/// Coordinate-descent path solver.
#[derive(Debug, Clone)]
pub struct CoordinateDescentSolver {
    /// Elastic-net mixing: `1.0` is the lasso.
    pub alpha: f64,
    /// Convergence threshold on the largest weighted squared coefficient
    /// change, relative to the null deviance.
    pub tolerance: f64,
    /// Maximum coordinate passes per penalized least-squares fit.
    pub max_passes: usize,
    /// Maximum IRLS iterations per lambda.
    pub max_irls: usize,
    /// Maximum step halvings per IRLS iteration.
    pub max_halvings: usize,
    /// Stop the path once this fraction of the null deviance is explained.
    pub max_deviance_explained: f64,
}

impl Default for CoordinateDescentSolver {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            tolerance: 1e-7,
            max_passes: 1000,
            max_irls: 50,
            max_halvings: 20,
            max_deviance_explained: 0.999,
        }
    }
}

/// Standardized copies of the non-constant columns.
struct Standardized {
    /// Original column index of each retained column.
    columns: Vec<usize>,
    z: Vec<Vec<f64>>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardized {
    fn new(x: ArrayView2<'_, f32>, weights: &[f64], parallelism: Parallelism) -> Self {
        let stats = parallelism.maybe_par_map(0..x.ncols(), |j| {
            let col: Vec<f64> = x
                .column(j)
                .iter()
                .map(|&v| if v.is_nan() { 0.0 } else { v as f64 })
                .collect();
            let mean: f64 = col.iter().zip(weights).map(|(v, w)| v * w).sum();
            let var: f64 = col
                .iter()
                .zip(weights)
                .map(|(v, w)| w * (v - mean) * (v - mean))
                .sum();
            let scale = var.sqrt();
            if scale < 1e-10 {
                return None;
            }
            let z = col.iter().map(|v| (v - mean) / scale).collect::<Vec<_>>();
            Some((j, z, mean, scale))
        });

        let mut out = Self {
            columns: Vec::new(),
            z: Vec::new(),
            means: Vec::new(),
            scales: Vec::new(),
        };
        for (j, z, mean, scale) in stats.into_iter().flatten() {
            out.columns.push(j);
            out.z.push(z);
            out.means.push(mean);
            out.scales.push(scale);
        }
        out
    }

    fn len(&self) -> usize {
        self.columns.len()
    }
}

/// Soft-thresholding operator for L1 regularization.
#[inline]
pub(crate) fn soft_threshold(x: f64, threshold: f64) -> f64 {
    if x > threshold {
        x - threshold
    } else if x < -threshold {
        x + threshold
    } else {
        0.0
    }
}

/// Target of output `k` for an encoded response.
#[inline]
fn target(family: Family, y: f64, k: usize) -> f64 {
    if y.is_nan() {
        return 0.0;
    }
    match family {
        Family::Regression | Family::Binomial => y,
        Family::Multinomial { .. } => f64::from(y as usize == k),
    }
}

/// Mean of output `k` on the response scale, per row.
fn output_means(family: Family, eta: &[Vec<f64>], k: usize) -> Vec<f64> {
    let n = eta[0].len();
    match family {
        Family::Regression => eta[0].clone(),
        Family::Binomial => eta[0].iter().map(|&e| sigmoid(e)).collect(),
        Family::Multinomial { n_classes } => {
            let mut row = vec![0.0; n_classes];
            let mut p = vec![0.0; n_classes];
            (0..n)
                .map(|i| {
                    row.iter_mut().zip(eta).for_each(|(r, e)| *r = e[i]);
                    softmax(&row, &mut p);
                    p[k]
                })
                .collect()
        }
    }
}

/// `eta = beta0 + Σ z_j β_j` over the nonzero coefficients.
fn linear_predictor(z: &[Vec<f64>], beta: &[f64], beta0: f64, eta: &mut [f64]) {
    eta.iter_mut().for_each(|e| *e = beta0);
    for (col, &b) in z.iter().zip(beta) {
        if b != 0.0 {
            eta.iter_mut().zip(col).for_each(|(e, z)| *e += z * b);
        }
    }
}

fn path_deviance(family: Family, eta: &[Vec<f64>], y: &[f64], weights: &[f64]) -> f64 {
    let k = eta.len();
    let n = y.len();
    let mut row_major = Vec::with_capacity(n * k);
    for i in 0..n {
        row_major.extend(eta.iter().map(|e| e[i]));
    }
    family.deviance(&row_major, y, weights)
}

impl CoordinateDescentSolver {
    /// Penalized weighted least squares for one output, warm started from
    /// `beta`/`beta0`. Recomputes `eta` from the solution.
    ///
    /// Returns whether the coordinate passes converged, and the largest
    /// weighted squared change between the starting and final coefficients.
    #[allow(clippy::too_many_arguments)]
    fn weighted_lasso(
        &self,
        z: &[Vec<f64>],
        w: &[f64],
        t: &[f64],
        beta: &mut [f64],
        beta0: &mut f64,
        eta: &mut [f64],
        lambda: f64,
        tol: f64,
    ) -> (bool, f64) {
        let sum_w: f64 = w.iter().sum();
        if sum_w <= 0.0 {
            return (true, 0.0);
        }

        let mut r: Vec<f64> = t.iter().zip(eta.iter()).map(|(t, e)| t - e).collect();
        let xv: Vec<f64> = z
            .iter()
            .map(|col| col.iter().zip(w).map(|(z, w)| w * z * z).sum())
            .collect();
        let start = beta.to_vec();
        let start0 = *beta0;

        let step = CoordinateStep {
            z,
            w,
            xv: &xv,
            sum_w,
            l1: lambda * self.alpha,
            l2: lambda * (1.0 - self.alpha),
        };

        let mut passes = 0;
        let converged = 'outer: loop {
            let change = step.pass(0..z.len(), &mut r, beta, beta0);
            passes += 1;
            if change < tol {
                break true;
            }
            // Iterate on the active set until it settles, then re-check all columns.
            loop {
                if passes >= self.max_passes {
                    break 'outer false;
                }
                let active: Vec<usize> = (0..z.len()).filter(|&j| beta[j] != 0.0).collect();
                let change = step.pass(active.into_iter(), &mut r, beta, beta0);
                passes += 1;
                if change < tol {
                    break;
                }
            }
            if passes >= self.max_passes {
                break false;
            }
        };

        linear_predictor(z, beta, *beta0, eta);

        let d0 = *beta0 - start0;
        let change = xv
            .iter()
            .zip(beta.iter().zip(&start))
            .map(|(xv, (b, s))| xv * (b - s) * (b - s))
            .fold(sum_w * d0 * d0, f64::max);
        (converged, change)
    }

    /// Half the deviance plus the elastic-net penalty, on the normalized
    /// weight scale the coordinate steps minimize.
    fn objective(
        &self,
        family: Family,
        eta: &[Vec<f64>],
        y: &[f64],
        v: &[f64],
        beta: &[Vec<f64>],
        lambda: f64,
    ) -> f64 {
        let penalty: f64 = beta
            .iter()
            .flatten()
            .map(|b| self.alpha * b.abs() + 0.5 * (1.0 - self.alpha) * b * b)
            .sum();
        0.5 * path_deviance(family, eta, y, v) + lambda * penalty
    }

    /// IRLS for binomial and multinomial families. Returns whether both the
    /// outer loop and every inner fit of the final iteration converged.
    #[allow(clippy::too_many_arguments)]
    fn irls(
        &self,
        std: &Standardized,
        v: &[f64],
        y: &[f64],
        family: Family,
        beta: &mut [Vec<f64>],
        beta0: &mut [f64],
        eta: &mut [Vec<f64>],
        lambda: f64,
        tol: f64,
    ) -> Result<bool, SolverError> {
        let n = y.len();
        let mut objective = self.objective(family, eta, y, v, beta, lambda);
        let mut w = vec![0.0; n];
        let mut t = vec![0.0; n];

        for _ in 0..self.max_irls {
            let saved_beta = beta.to_vec();
            let saved_beta0 = beta0.to_vec();
            let mut inner_converged = true;
            let mut change = 0.0f64;
            for k in 0..family.n_outputs() {
                let mu = output_means(family, eta, k);
                for i in 0..n {
                    let variance = (mu[i] * (1.0 - mu[i])).max(1e-5);
                    w[i] = v[i] * variance;
                    t[i] = eta[k][i] + (target(family, y[i], k) - mu[i]) / variance;
                }
                let (ok, delta) =
                    self.weighted_lasso(&std.z, &w, &t, &mut beta[k], &mut beta0[k], &mut eta[k], lambda, tol);
                inner_converged &= ok;
                change = change.max(delta);
            }

            if matches!(family, Family::Multinomial { .. }) {
                let shift = beta0.iter().sum::<f64>() / beta0.len() as f64;
                beta0.iter_mut().for_each(|b| *b -= shift);
                eta.iter_mut().flatten().for_each(|e| *e -= shift);
            }

            let slack = 1e-9 * objective.abs().max(1.0);
            let mut current = self.objective(family, eta, y, v, beta, lambda);
            let mut halvings = 0;
            while !(current <= objective + slack) {
                if halvings == self.max_halvings {
                    beta.clone_from_slice(&saved_beta);
                    beta0.copy_from_slice(&saved_beta0);
                    for (k, eta_k) in eta.iter_mut().enumerate() {
                        linear_predictor(&std.z, &beta[k], beta0[k], eta_k);
                    }
                    return Ok(inner_converged && change < tol);
                }
                for (b, s) in beta.iter_mut().flatten().zip(saved_beta.iter().flatten()) {
                    *b = 0.5 * (*b + s);
                }
                for (b, s) in beta0.iter_mut().zip(&saved_beta0) {
                    *b = 0.5 * (*b + s);
                }
                for (k, eta_k) in eta.iter_mut().enumerate() {
                    linear_predictor(&std.z, &beta[k], beta0[k], eta_k);
                }
                current = self.objective(family, eta, y, v, beta, lambda);
                halvings += 1;
            }
            if !current.is_finite() {
                return Err(SolverError::NonFinite("deviance"));
            }
            objective = current;

            // A proposed step this small means the fit is at its fixed point.
            if change < tol {
                return Ok(inner_converged);
            }
        }
        Ok(false)
    }

    fn lambda_max(&self, std: &Standardized, v: &[f64], y: &[f64], family: Family, eta: &[Vec<f64>]) -> f64 {
        let mut max = 0.0f64;
        for k in 0..family.n_outputs() {
            let mu = output_means(family, eta, k);
            let r: Vec<f64> = y
                .iter()
                .zip(&mu)
                .zip(v)
                .map(|((&yi, &m), &vi)| if vi > 0.0 { vi * (target(family, yi, k) - m) } else { 0.0 })
                .collect();
            for col in &std.z {
                let g: f64 = col.iter().zip(&r).map(|(z, r)| z * r).sum();
                max = max.max(g.abs());
            }
        }
        // Nudged up so rounding never lets a column in at the first lambda.
        max * (1.0 + 1e-9) / self.alpha.max(1e-3)
    }
}

/// Shared inputs of a coordinate pass.
struct CoordinateStep<'a> {
    z: &'a [Vec<f64>],
    w: &'a [f64],
    xv: &'a [f64],
    sum_w: f64,
    l1: f64,
    l2: f64,
}

impl CoordinateStep<'_> {
    /// Update the given coordinates then the intercept. Returns the largest
    /// weighted squared change.
    fn pass(
        &self,
        features: impl Iterator<Item = usize>,
        r: &mut [f64],
        beta: &mut [f64],
        beta0: &mut f64,
    ) -> f64 {
        let mut max_change = 0.0f64;
        for j in features {
            let xv = self.xv[j];
            if xv <= 0.0 {
                continue;
            }
            let col = &self.z[j];
            let grad: f64 = col
                .iter()
                .zip(self.w)
                .zip(r.iter())
                .map(|((z, w), r)| w * z * r)
                .sum();
            let old = beta[j];
            let new = soft_threshold(grad + xv * old, self.l1) / (xv + self.l2);
            let delta = new - old;
            if delta != 0.0 {
                beta[j] = new;
                r.iter_mut().zip(col).for_each(|(r, z)| *r -= z * delta);
                max_change = max_change.max(xv * delta * delta);
            }
        }

        let shift = r.iter().zip(self.w).map(|(r, w)| r * w).sum::<f64>() / self.sum_w;
        if shift != 0.0 {
            *beta0 += shift;
            r.iter_mut().for_each(|r| *r -= shift);
            max_change = max_change.max(self.sum_w * shift * shift);
        }
        max_change
    }
}

/// Geometric sequence from `lambda_max` down to `lambda_max * ratio`.
fn lambda_sequence(lambda_max: f64, ratio: f64, n: usize) -> Vec<f64> {
    if lambda_max <= 0.0 {
        return vec![0.0];
    }
    if n == 1 {
        return vec![lambda_max];
    }
    let log_ratio = ratio.ln();
    (0..n)
        .map(|l| lambda_max * (log_ratio * l as f64 / (n - 1) as f64).exp())
        .collect()
}

impl PathSolver for CoordinateDescentSolver {
    fn fit_path(
        &self,
        problem: &LinearProblem<'_>,
        cancel: &CancellationToken,
    ) -> Result<RegularizationPath, SolverError> {
        let (n, p) = problem.x.dim();
        let family = problem.family;
        let y = problem.y;
        for len in [y.len(), problem.weights.len()] {
            if len != n {
                return Err(SolverError::ResponseLength { expected: n, found: len });
            }
        }

        // Rows with a missing response carry no weight.
        let raw: Vec<f64> = y
            .iter()
            .zip(problem.weights)
            .map(|(&yi, &wi)| if yi.is_nan() || !(wi > 0.0) { 0.0 } else { wi })
            .collect();
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return Err(SolverError::EmptyProblem);
        }
        let v: Vec<f64> = raw.iter().map(|w| w / total).collect();

        let std = Standardized::new(problem.x, &v, problem.parallelism);
        let k_out = family.n_outputs();

        let null_intercepts = family.null_intercepts(y, &raw);
        let mut beta0 = null_intercepts.clone();
        let mut eta: Vec<Vec<f64>> = beta0.iter().map(|&b| vec![b; n]).collect();
        let mut beta = vec![vec![0.0; std.len()]; k_out];
        let null_deviance = path_deviance(family, &eta, y, &raw);
        // Coefficient-change threshold on the normalized weight scale.
        let tol = self.tolerance * path_deviance(family, &eta, y, &v).max(1e-12);

        let lambda_max = self.lambda_max(&std, &v, y, family, &eta);
        let lambdas = lambda_sequence(lambda_max, problem.resolved_lambda_min_ratio(), problem.n_lambdas);
        log::debug!(
            "lasso path: {} rows, {} columns ({} non-constant), lambda_max {:.6}, {} lambdas",
            n,
            p,
            std.len(),
            lambda_max,
            lambdas.len()
        );

        let mut points = Vec::with_capacity(lambdas.len());
        for &lambda in &lambdas {
            if cancel.is_cancelled() {
                return Err(SolverError::Cancelled);
            }

            let converged = match family {
                Family::Regression => {
                    let t: Vec<f64> = y.iter().map(|&yi| target(family, yi, 0)).collect();
                    self.weighted_lasso(&std.z, &v, &t, &mut beta[0], &mut beta0[0], &mut eta[0], lambda, tol)
                        .0
                }
                Family::Binomial | Family::Multinomial { .. } => {
                    self.irls(&std, &v, y, family, &mut beta, &mut beta0, &mut eta, lambda, tol)?
                }
            };

            let deviance = path_deviance(family, &eta, y, &raw);
            if !deviance.is_finite() {
                return Err(SolverError::NonFinite("deviance"));
            }

            let mut coefficients = Array2::<f64>::zeros((p, k_out));
            let mut intercepts = beta0.clone();
            for (k, beta_k) in beta.iter().enumerate() {
                for (idx, &b) in beta_k.iter().enumerate() {
                    if b == 0.0 {
                        continue;
                    }
                    let scaled = b / std.scales[idx];
                    coefficients[[std.columns[idx], k]] = scaled;
                    intercepts[k] -= scaled * std.means[idx];
                }
            }

            let point = PathPoint {
                lambda,
                coefficients,
                intercepts,
                deviance,
                converged,
            };
            let n_nonzero = point.n_nonzero();
            log::trace!(
                "lambda {:.6}: {} nonzero, deviance {:.6}, converged {}",
                lambda,
                n_nonzero,
                deviance,
                converged
            );
            points.push(point);

            let explained = if null_deviance > 0.0 { 1.0 - deviance / null_deviance } else { 1.0 };
            if explained > self.max_deviance_explained {
                log::debug!("lasso path stopped: {:.4} of deviance explained", explained);
                break;
            }
            if problem.max_active.is_some_and(|max| n_nonzero > max) {
                log::debug!("lasso path stopped: {} nonzero columns", n_nonzero);
                break;
            }
        }

        Ok(RegularizationPath {
            points,
            null_deviance,
            null_intercepts,
        })
    }
}
