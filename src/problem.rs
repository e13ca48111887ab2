//! Problem definition trait.
//!
//! This module defines the `Problem` trait, which represents a nonlinear
//! least squares problem solved by the minimizers in this crate.

use ndarray::{Array1, Array2};

use crate::error::{Result, SasFitError};

/// A trait representing a nonlinear least squares problem.
///
/// Implementors must be `Sync`: model evaluation is parallelized internally and
/// problems are shared with blocking worker threads.
pub trait Problem: Sync {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// The default implementation uses forward finite differences.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, Default::default())
    }

    /// Evaluate the sum of squared residuals at the given parameters.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// Cost at `params` for derivative-free searches.
///
/// A failed model evaluation or a non-finite cost maps to `+inf` so the point
/// is simply never accepted; any other error is propagated.
pub fn cost_or_infinity<P: Problem + ?Sized>(problem: &P, params: &Array1<f64>) -> Result<f64> {
    match problem.eval_cost(params) {
        Ok(cost) if cost.is_finite() => Ok(cost),
        Ok(_) | Err(SasFitError::FunctionEvaluation(_)) => Ok(f64::INFINITY),
        Err(e) => Err(e),
    }
}


#[cfg(test)]
mod tests {
    use super::test_problems::ExponentialDecay;
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_eval_cost_at_solution() {
        let problem = ExponentialDecay::new(2.0, 0.5);
        let cost = problem.eval_cost(&array![2.0, 0.5]).unwrap();
        assert_relative_eq!(cost, 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_cost_or_infinity() {
        struct Failing;
        impl Problem for Failing {
            fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
                if params[0] < 0.0 {
                    return Err(SasFitError::FunctionEvaluation("negative".to_string()));
                }
                Ok(params.clone())
            }
            fn parameter_count(&self) -> usize {
                1
            }
            fn residual_count(&self) -> usize {
                1
            }
        }

        assert_eq!(cost_or_infinity(&Failing, &array![2.0]).unwrap(), 4.0);
        assert!(cost_or_infinity(&Failing, &array![-1.0]).unwrap().is_infinite());
        assert!(cost_or_infinity(&Failing, &array![f64::NAN]).unwrap().is_infinite());
    }

    #[test]
    fn test_default_jacobian() {
        let problem = ExponentialDecay::new(2.0, 0.5);
        let jac = problem.jacobian(&array![2.0, 0.5]).unwrap();
        assert_eq!(jac.dim(), (25, 2));
        // d/da at x = 0 is exp(0) = 1
        assert_relative_eq!(jac[[0, 0]], 1.0, epsilon = 1e-6);
    }
}
