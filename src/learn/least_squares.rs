use nalgebra::DMatrix;

use super::registry::RegressorOptions;
use super::supervised::Regressor;
use crate::error::{ModelError, Result};

/// Condition numbers above this reject the fit.
pub const DEFAULT_MAX_CONDITION: f64 = 1e12;

/// 2-norm condition number `σ_max / σ_min` of `x`; infinite when `x` is
/// rank deficient, NaN when `x` holds a non-finite entry.
pub fn condition_number(x: &DMatrix<f64>) -> f64 {
    if x.is_empty() {
        return f64::INFINITY;
    }
    // The SVD does not converge on NaN/inf input.
    if x.iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    let sv = x.singular_values();
    let (max, min) = (sv.max(), sv.min());
    if min <= 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

// ---------------------------------------------------------------------------
// LeastSquaresRegressor
// ---------------------------------------------------------------------------

/// Ordinary least squares solved through a QR decomposition of X.
///
/// For an `m × k` design with `m ≥ k`, `X = Q·R` with `Q` of shape `m × k`
/// and `R` upper triangular `k × k`; the weights solve `R·W = Qᵀ·Y`.  One
/// weight column is produced per target column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquaresRegressor {
    pub max_condition: f64,
}

impl LeastSquaresRegressor {
    pub const ID: &'static str = "least_squares";

    pub fn new(max_condition: f64) -> Self {
        Self { max_condition }
    }
}

impl Default for LeastSquaresRegressor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONDITION)
    }
}

impl Regressor for LeastSquaresRegressor {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn options(&self) -> RegressorOptions {
        RegressorOptions {
            max_condition: self.max_condition,
        }
    }

    fn train(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let (rows, k) = x.shape();
        if y.nrows() != rows {
            return Err(ModelError::ShapeMismatch(format!(
                "{rows} feature rows but {} target rows",
                y.nrows()
            )));
        }
        if k == 0 {
            return Err(ModelError::ShapeMismatch("design matrix has no columns".to_string()));
        }
        if rows < k {
            return Err(ModelError::InsufficientData { rows });
        }

        if y.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NumericalInstability {
                condition_number: f64::NAN,
            });
        }
        let condition_number = condition_number(x);
        log::debug!("least squares: {rows}x{k} design, condition number {condition_number:e}");
        if !condition_number.is_finite() || condition_number > self.max_condition {
            return Err(ModelError::NumericalInstability { condition_number });
        }

        let qr = x.clone().qr();
        let q = qr.q();
        let r = qr.r();
        let b = q.transpose() * y;

        let weights = r
            .view((0, 0), (k, k))
            .solve_upper_triangular(&b.rows(0, k))
            .ok_or(ModelError::NumericalInstability { condition_number })?;
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::NumericalInstability { condition_number });
        }
        Ok(weights)
    }

    fn eval(&self, x: &DMatrix<f64>, params: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if x.ncols() != params.nrows() {
            return Err(ModelError::ShapeMismatch(format!(
                "{} feature columns but {} parameter rows",
                x.ncols(),
                params.nrows()
            )));
        }
        Ok(x * params)
    }
}
