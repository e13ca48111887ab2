//! Convergence criteria for optimization algorithms.
//!
//! This module defines the criteria used to determine when an optimization
//! algorithm has converged, and the result every minimizer returns.

use ndarray::Array1;
use std::fmt;

/// Possible convergence states for an optimization algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The algorithm is still running.
    Running,

    /// The algorithm has converged due to a small parameter change.
    ParameterConvergence,

    /// The algorithm has converged due to a small function value change.
    FunctionValueConvergence,

    /// The algorithm has converged due to a small gradient.
    GradientConvergence,

    /// The algorithm has terminated due to reaching the maximum number of iterations.
    MaxIterationsReached,

    /// The algorithm was stopped at a cancellation checkpoint.
    Cancelled,

    /// The algorithm has terminated due to a numerical error.
    NumericalError,
}

impl ConvergenceStatus {
    /// Returns true if the optimization has terminated (either converged or failed).
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the optimization has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::Running => "Optimization is still running",
            ConvergenceStatus::ParameterConvergence => "Converged: small parameter change",
            ConvergenceStatus::FunctionValueConvergence => "Converged: small function value change",
            ConvergenceStatus::GradientConvergence => "Converged: small gradient",
            ConvergenceStatus::MaxIterationsReached => "Terminated: maximum iterations reached",
            ConvergenceStatus::Cancelled => "Terminated: cancelled",
            ConvergenceStatus::NumericalError => "Terminated: numerical error",
        }
    }
}

/// Criteria for determining when an optimization algorithm has converged.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    /// Tolerance for change in parameter values.
    pub xtol: f64,

    /// Tolerance for change in function value.
    pub ftol: f64,

    /// Tolerance for gradient norm.
    pub gtol: f64,

    /// Maximum number of iterations.
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            xtol: 1e-8,
            ftol: 1e-8,
            gtol: 1e-8,
            max_iterations: 100,
        }
    }
}

impl ConvergenceCriteria {
    pub fn new(xtol: f64, ftol: f64, gtol: f64, max_iterations: usize) -> Self {
        Self {
            xtol,
            ftol,
            gtol,
            max_iterations,
        }
    }

    /// Checks whether the optimization has converged based on the current state.
    ///
    /// # Arguments
    ///
    /// * `params` - The current parameter values
    /// * `new_params` - The new parameter values
    /// * `cost` - The current function value
    /// * `new_cost` - The new function value
    /// * `gradient_norm` - The norm of the gradient
    /// * `iterations` - The number of iterations so far
    ///
    /// # Returns
    ///
    /// * The convergence status
    pub fn check(
        &self,
        params: &Array1<f64>,
        new_params: &Array1<f64>,
        cost: f64,
        new_cost: f64,
        gradient_norm: f64,
        iterations: usize,
    ) -> ConvergenceStatus {
        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }

        if gradient_norm < self.gtol {
            return ConvergenceStatus::GradientConvergence;
        }

        let param_change = new_params
            .iter()
            .zip(params.iter())
            .map(|(a, b)| (a - b).abs() / (b.abs().max(1.0)))
            .fold(0.0, f64::max);
        if param_change < self.xtol {
            return ConvergenceStatus::ParameterConvergence;
        }

        let cost_change = (cost - new_cost).abs() / cost.max(1e-10);
        if cost_change < self.ftol {
            return ConvergenceStatus::FunctionValueConvergence;
        }

        ConvergenceStatus::Running
    }
}

/// Outcome of a local or global minimization.
#[derive(Debug, Clone)]
pub struct OptimizeResult {
    /// Best parameters found, in the optimizer's coordinates
    pub params: Array1<f64>,

    /// Sum of squared residuals at `params`
    pub cost: f64,

    pub iterations: usize,

    pub func_evals: usize,

    pub status: ConvergenceStatus,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for OptimizeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Status: {}", self.status.description())?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_convergence_criteria() {
        let criteria = ConvergenceCriteria::default();

        let params = array![1.0, 2.0, 3.0];
        let new_params = array![1.0000000001, 2.0000000001, 3.0000000001];
        let status = criteria.check(&params, &new_params, 10.0, 9.9, 0.1, 50);
        assert_eq!(status, ConvergenceStatus::ParameterConvergence);

        let new_params = array![1.1, 2.1, 3.1];
        let status = criteria.check(&params, &new_params, 10.0, 9.99999999999, 0.1, 50);
        assert_eq!(status, ConvergenceStatus::FunctionValueConvergence);

        let status = criteria.check(&params, &new_params, 10.0, 9.0, 1e-9, 50);
        assert_eq!(status, ConvergenceStatus::GradientConvergence);

        let status = criteria.check(&params, &new_params, 10.0, 9.0, 0.1, 100);
        assert_eq!(status, ConvergenceStatus::MaxIterationsReached);

        let status = criteria.check(&params, &new_params, 10.0, 9.0, 0.1, 50);
        assert_eq!(status, ConvergenceStatus::Running);
    }

    #[test]
    fn test_convergence_status_methods() {
        assert!(!ConvergenceStatus::Running.is_terminated());
        assert!(ConvergenceStatus::Cancelled.is_terminated());
        assert!(ConvergenceStatus::GradientConvergence.is_converged());
        assert!(!ConvergenceStatus::MaxIterationsReached.is_converged());
        assert!(!ConvergenceStatus::Cancelled.is_converged());
        assert!(!ConvergenceStatus::NumericalError.is_converged());
    }
}
