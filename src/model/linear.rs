//! The fitted sparse linear model over activation columns.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::training::{Family, PathPoint};
use crate::utils::Parallelism;

/// Coefficients of one nonzero activation column, one value per output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEntry {
    pub column: usize,
    pub values: Vec<f64>,
}

/// Sparse coefficient vector, sorted by column. Absent columns are zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseCoefficients {
    entries: Vec<CoefficientEntry>,
}

impl SparseCoefficients {
    /// Keep the rows of a dense `n_columns x n_outputs` matrix with any nonzero.
    pub fn from_dense(coefficients: ArrayView2<'_, f64>) -> Self {
        let entries = coefficients
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|&c| c != 0.0))
            .map(|(column, row)| CoefficientEntry {
                column,
                values: row.to_vec(),
            })
            .collect();
        Self { entries }
    }

    #[inline]
    pub fn n_nonzero(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[CoefficientEntry] {
        &self.entries
    }

    /// Coefficients of `column`, `None` when zero.
    pub fn get(&self, column: usize) -> Option<&[f64]> {
        self.entries
            .binary_search_by_key(&column, |e| e.column)
            .ok()
            .map(|i| self.entries[i].values.as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|e| e.column)
    }
}

/// Penalized GLM selected from the regularization path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    family: Family,
    intercepts: Vec<f64>,
    coefficients: SparseCoefficients,
    n_columns: usize,
    /// Penalty of the selected path point; `None` for the null model.
    lambda: Option<f64>,
    /// Training deviance of the selected point.
    deviance: f64,
}

impl LinearModel {
    pub fn from_path_point(family: Family, point: &PathPoint) -> Self {
        Self {
            family,
            intercepts: point.intercepts.clone(),
            coefficients: SparseCoefficients::from_dense(point.coefficients.view()),
            n_columns: point.coefficients.nrows(),
            lambda: Some(point.lambda),
            deviance: point.deviance,
        }
    }

    /// Intercept-only model.
    pub fn intercept_only(family: Family, intercepts: Vec<f64>, n_columns: usize, deviance: f64) -> Self {
        Self {
            family,
            intercepts,
            coefficients: SparseCoefficients::default(),
            n_columns,
            lambda: None,
            deviance,
        }
    }

    #[inline]
    pub fn family(&self) -> Family {
        self.family
    }

    pub fn intercepts(&self) -> &[f64] {
        &self.intercepts
    }

    pub fn coefficients(&self) -> &SparseCoefficients {
        &self.coefficients
    }

    #[inline]
    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    pub fn lambda(&self) -> Option<f64> {
        self.lambda
    }

    pub fn deviance(&self) -> f64 {
        self.deviance
    }

    /// Check that coefficients and intercepts fit an activation matrix of
    /// `n_columns` columns.
    pub(crate) fn check_shape(&self, n_columns: usize) -> Result<(), String> {
        let n_outputs = self.family.n_outputs();
        if self.n_columns != n_columns {
            return Err(format!("linear model has {} columns, layout has {n_columns}", self.n_columns));
        }
        if self.intercepts.len() != n_outputs {
            return Err(format!("{} intercepts for {n_outputs} outputs", self.intercepts.len()));
        }
        for entry in self.coefficients.entries() {
            if entry.column >= n_columns {
                return Err(format!("coefficient column {} out of range", entry.column));
            }
            if entry.values.len() != n_outputs {
                return Err(format!("column {} has {} coefficients", entry.column, entry.values.len()));
            }
        }
        Ok(())
    }

    /// Linear predictors, `n_rows x n_outputs`.
    pub fn predict_link(&self, x: ArrayView2<'_, f32>) -> Array2<f64> {
        let n_outputs = self.family.n_outputs();
        let mut eta = Array2::<f64>::zeros((x.nrows(), n_outputs));
        for (mut row, xi) in eta.rows_mut().into_iter().zip(x.rows()) {
            for (k, e) in row.iter_mut().enumerate() {
                *e = self.intercepts.get(k).copied().unwrap_or(0.0);
            }
            for entry in self.coefficients.entries() {
                let v = xi.get(entry.column).copied().unwrap_or(0.0) as f64;
                if v != 0.0 {
                    for (e, &c) in row.iter_mut().zip(&entry.values) {
                        *e += c * v;
                    }
                }
            }
        }
        eta
    }

    /// Response-scale predictions, `n_rows x n_response_columns`: fitted
    /// values for regression, class probabilities otherwise.
    pub fn predict(&self, x: ArrayView2<'_, f32>, parallelism: Parallelism) -> Array2<f64> {
        let eta = self.predict_link(x);
        let mut out = Array2::<f64>::zeros((x.nrows(), self.family.n_response_columns()));
        let family = self.family;
        let apply = |mut o: ndarray::ArrayViewMut1<'_, f64>, e: ndarray::ArrayView1<'_, f64>| {
            let e = e.to_vec();
            let mut buf = vec![0.0; o.len()];
            family.link_inverse(&e, &mut buf);
            o.iter_mut().zip(buf).for_each(|(d, v)| *d = v);
        };
        let zip = ndarray::Zip::from(out.rows_mut()).and(eta.rows());
        if parallelism.is_parallel() {
            zip.par_for_each(apply);
        } else {
            zip.for_each(apply);
        }
        out
    }
}
