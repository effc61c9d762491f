use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Fit quality for each target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Root-mean-square residual, one entry per target column.
    #[serde(rename = "RMSE")]
    pub rmse: Vec<f64>,
    /// Sum of squared residuals, one entry per target column.
    #[serde(rename = "SE")]
    pub se: Vec<f64>,
    pub rows: usize,
}

impl ErrorReport {
    /// Build the report from a residual matrix `Y - Ŷ`.
    pub fn from_residuals(residuals: &DMatrix<f64>) -> Result<Self> {
        let rows = residuals.nrows();
        if rows == 0 {
            return Err(ModelError::InsufficientData { rows });
        }
        let se: Vec<f64> = residuals
            .column_iter()
            .map(|c| c.norm_squared())
            .collect();
        let rmse = se.iter().map(|s| (s / rows as f64).sqrt()).collect();
        Ok(ErrorReport { rmse, se, rows })
    }

    /// Summed squared error over all target columns.
    pub fn total_se(&self) -> f64 {
        self.se.iter().sum()
    }
}

/// Per-target residual diagnostics logged by the verbose error paths.
pub(crate) fn log_residuals(label: &str, residuals: &DMatrix<f64>) {
    for (j, col) in residuals.column_iter().enumerate() {
        let max_abs = col.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
        let bias = col.mean();
        log::info!(
            "{label}: target {j}: {} rows, mean residual {bias:.6}, max |residual| {max_abs:.6}",
            col.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn se_and_rmse_per_column() {
        let r = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, -1.0, 2.0, 1.0, 0.0, -1.0, 0.0]);
        let report = ErrorReport::from_residuals(&r).unwrap();
        assert_eq!(report.rows, 4);
        assert_relative_eq!(report.se[0], 4.0);
        assert_relative_eq!(report.se[1], 4.0);
        assert_relative_eq!(report.rmse[0], 1.0);
        assert_relative_eq!(report.total_se(), 8.0);
    }

    #[test]
    fn serializes_with_upper_case_keys() {
        let r = DMatrix::from_row_slice(1, 1, &[2.0]);
        let json = serde_json::to_value(ErrorReport::from_residuals(&r).unwrap()).unwrap();
        assert_eq!(json["SE"][0], 4.0);
        assert_eq!(json["RMSE"][0], 2.0);
    }

    #[test]
    fn empty_residuals_are_insufficient() {
        let r = DMatrix::<f64>::zeros(0, 1);
        assert_eq!(
            ErrorReport::from_residuals(&r).unwrap_err(),
            ModelError::InsufficientData { rows: 0 }
        );
    }
}
