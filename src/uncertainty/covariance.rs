//! # Covariance Matrix Calculations
//!
//! This module provides functions for calculating covariance matrices from
//! Jacobian matrices in nonlinear least-squares optimization.

use ndarray::{Array2, ArrayView2};
use tracing::warn;

use crate::utils::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Calculate covariance matrix from Jacobian matrix.
///
/// For nonlinear least-squares problems, the covariance matrix is estimated as:
///   covar = scale * inv(J^T * J)
/// where:
///   - J is the Jacobian of the weighted residuals
///   - scale is 1 or the reduced chi-square (chi^2 / dof)
///
/// Returns `None` when J^T * J is singular.
pub fn calculate_covariance(jacobian: ArrayView2<f64>, scale: f64) -> Option<Array2<f64>> {
    let j = ndarray_to_nalgebra(&jacobian.to_owned());
    let jtj = j.transpose() * &j;
    let inverse = jtj.try_inverse()?;
    if inverse.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(nalgebra_to_ndarray(&(inverse * scale)))
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements of the
/// covariance matrix. A negative or non-finite variance yields `None`.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Vec<Option<f64>> {
    covar
        .diag()
        .iter()
        .map(|&var| (var.is_finite() && var >= 0.0).then(|| var.sqrt()))
        .collect()
}

/// Standard errors for every column of `jacobian`, all `None` if the
/// covariance cannot be formed.
pub fn standard_errors(jacobian: ArrayView2<f64>, scale: f64) -> Vec<Option<f64>> {
    match calculate_covariance(jacobian, scale) {
        Some(covar) => standard_errors_from_covariance(&covar),
        None => {
            warn!(parameters = jacobian.ncols(), "covariance matrix is singular");
            vec![None; jacobian.ncols()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_calculate_covariance() {
        // Create a simple Jacobian (2 parameters, 3 data points)
        let jacobian = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let covar = calculate_covariance(jacobian.view(), 2.0).unwrap();

        // JᵀJ = [[35, 44], [44, 56]], det = 24
        assert_eq!(covar.shape(), &[2, 2]);
        assert_relative_eq!(covar[[0, 0]], 2.0 * 56.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[1, 1]], 2.0 * 35.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], -2.0 * 44.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], covar[[1, 0]], epsilon = 1e-12);
    }

    #[test]
    fn test_singular_jacobian() {
        let jacobian = arr2(&[[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]]);
        assert!(calculate_covariance(jacobian.view(), 1.0).is_none());
        assert_eq!(standard_errors(jacobian.view(), 1.0), vec![None, None]);
    }

    #[test]
    fn test_standard_errors_from_covariance() {
        let covar = arr2(&[[0.1, 0.05], [0.05, -0.2]]);

        let errors = standard_errors_from_covariance(&covar);

        assert_eq!(errors.len(), 2);
        assert_relative_eq!(errors[0].unwrap(), 0.1f64.sqrt(), epsilon = 1e-10);
        assert_eq!(errors[1], None);
    }
}
