//! Numerical Jacobians of residual vectors.

use crate::error::{Result, SasFitError};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Relative step for forward differences, close to sqrt(machine epsilon).
const FORWARD_STEP: f64 = 1.49e-8;

/// Relative step for central differences, close to cbrt(machine epsilon).
const CENTRAL_STEP: f64 = 6.06e-6;

/// Difference scheme used to approximate a Jacobian column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difference {
    /// One extra evaluation per parameter, first order accurate.
    #[default]
    Forward,
    /// Two extra evaluations per parameter, second order accurate.
    Central,
}

impl Difference {
    fn step(self, value: f64) -> f64 {
        let relative = match self {
            Difference::Forward => FORWARD_STEP,
            Difference::Central => CENTRAL_STEP,
        };
        relative * value.abs().max(1.0)
    }
}

fn checked_eval(problem: &dyn Problem, params: &Array1<f64>) -> Result<Array1<f64>> {
    let residuals = problem.eval(params)?;
    if residuals.len() != problem.residual_count() {
        return Err(SasFitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            problem.residual_count(),
            residuals.len()
        )));
    }
    Ok(residuals)
}

/// Approximate J[i, j] = ∂residual[i]/∂param[j] at `params`.
///
/// Steps scale with the magnitude of each parameter and never drop below the
/// base step, so parameters sitting at zero still get a usable derivative.
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    scheme: Difference,
) -> Result<Array2<f64>> {
    let base = match scheme {
        Difference::Forward => Some(checked_eval(problem, params)?),
        Difference::Central => None,
    };

    let mut jac = Array2::zeros((problem.residual_count(), params.len()));
    for (j, mut column) in jac.columns_mut().into_iter().enumerate() {
        let h = scheme.step(params[j]);
        let mut upper = params.clone();
        upper[j] += h;
        let forward = checked_eval(problem, &upper)?;

        let derivative = match &base {
            Some(base) => (forward - base) / h,
            None => {
                let mut lower = params.clone();
                lower[j] -= h;
                (forward - checked_eval(problem, &lower)?) / (2.0 * h)
            }
        };
        column.assign(&derivative);
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_problems::Rosenbrock;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_forward_rosenbrock() {
        let jac = jacobian(&Rosenbrock, &array![0.5, 0.5], Difference::Forward).unwrap();
        assert_relative_eq!(jac[[0, 0]], -1.0, epsilon = 1e-6);
        assert_relative_eq!(jac[[0, 1]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(jac[[1, 0]], -10.0, epsilon = 1e-5);
        assert_relative_eq!(jac[[1, 1]], 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_central_is_tighter() {
        // d/dx of 10 (y - x^2) at x = 2 is -40
        let jac = jacobian(&Rosenbrock, &array![2.0, 1.0], Difference::Central).unwrap();
        assert_relative_eq!(jac[[1, 0]], -40.0, epsilon = 1e-8);
        assert_relative_eq!(jac[[1, 1]], 10.0, epsilon = 1e-8);
    }
}
