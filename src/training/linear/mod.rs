//! Regularization-path solvers for the sparse linear fit.
//!
//! A [`PathSolver`] fits a penalized generalized linear model over an
//! activation matrix at a decreasing sequence of penalty strengths and
//! returns every point of the path. Selecting a point is left to the caller.

mod coordinate;

pub use coordinate::CoordinateDescentSolver;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::training::Family;
use crate::utils::{CancellationToken, Parallelism};

/// Errors raised by a path solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("cancelled")]
    Cancelled,
    #[error("no rows with positive weight")]
    EmptyProblem,
    #[error("response has {found} rows, matrix has {expected}")]
    ResponseLength { expected: usize, found: usize },
    #[error("non-finite {0} encountered")]
    NonFinite(&'static str),
}

/// Inputs of one path fit.
#[derive(Debug, Clone)]
pub struct LinearProblem<'a> {
    /// Activation matrix, one row per sample.
    pub x: ArrayView2<'a, f32>,
    /// Encoded response (class codes for classification).
    pub y: &'a [f64],
    pub weights: &'a [f64],
    pub family: Family,
    /// Number of path points. Default: 100.
    pub n_lambdas: usize,
    /// Smallest lambda as a fraction of the largest. `None` picks `1e-4`
    /// when rows outnumber columns, `1e-2` otherwise.
    pub lambda_min_ratio: Option<f64>,
    /// Stop the path once more columns than this are nonzero.
    pub max_active: Option<usize>,
    pub parallelism: Parallelism,
}

impl<'a> LinearProblem<'a> {
    pub fn new(x: ArrayView2<'a, f32>, y: &'a [f64], weights: &'a [f64], family: Family) -> Self {
        Self {
            x,
            y,
            weights,
            family,
            n_lambdas: 100,
            lambda_min_ratio: None,
            max_active: None,
            parallelism: Parallelism::Sequential,
        }
    }

    pub(crate) fn resolved_lambda_min_ratio(&self) -> f64 {
        self.lambda_min_ratio.unwrap_or(if self.x.nrows() > self.x.ncols() {
            1e-4
        } else {
            1e-2
        })
    }
}

/// One point of a regularization path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub lambda: f64,
    /// Coefficients on the original column scale, `n_columns x n_outputs`.
    pub coefficients: Array2<f64>,
    /// One intercept per output.
    pub intercepts: Vec<f64>,
    /// Weighted training deviance at this point.
    pub deviance: f64,
    pub converged: bool,
}

impl PathPoint {
    /// Number of columns with a nonzero coefficient for any output.
    pub fn n_nonzero(&self) -> usize {
        self.coefficients
            .rows()
            .into_iter()
            .filter(|row| row.iter().any(|&c| c != 0.0))
            .count()
    }
}

/// A full regularization path, strongest penalty first.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizationPath {
    pub points: Vec<PathPoint>,
    /// Deviance of the intercept-only model.
    pub null_deviance: f64,
    pub null_intercepts: Vec<f64>,
}

/// Fits a regularization path.
pub trait PathSolver: Send + Sync {
    fn fit_path(
        &self,
        problem: &LinearProblem<'_>,
        cancel: &CancellationToken,
    ) -> Result<RegularizationPath, SolverError>;
}
