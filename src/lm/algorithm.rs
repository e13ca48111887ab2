//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core implementation of the Levenberg-Marquardt algorithm
//! for nonlinear least-squares optimization with Marquardt diagonal scaling.

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use tracing::debug;

use crate::control::RunControl;
use crate::convergence::{ConvergenceCriteria, ConvergenceStatus, OptimizeResult};
use crate::error::{Result, SasFitError};
use crate::problem::{cost_or_infinity, Problem};
use crate::utils::{nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra};

use super::config::{DecompositionMethod, LmConfig};

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for the gradient.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the method used for solving the linear system.
    pub fn with_decomposition_method(mut self, method: DecompositionMethod) -> Self {
        self.config.decomposition_method = method;
        self
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Trial points whose evaluation fails are treated as rejected steps. The run
    /// stops at the first cancellation checkpoint after `control` is cancelled.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    /// * `control` - Cancellation token and iteration cap
    ///
    /// # Returns
    ///
    /// * `Result<OptimizeResult>` - The result of the optimization
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        control: &RunControl,
    ) -> Result<OptimizeResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(SasFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let max_iterations = control.iteration_limit(self.config.max_iterations);
        let criteria = ConvergenceCriteria::new(
            self.config.xtol,
            self.config.ftol,
            self.config.gtol,
            max_iterations,
        );

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        if !cost.is_finite() {
            return Err(SasFitError::FunctionEvaluation(
                "initial cost is not finite".to_string(),
            ));
        }
        let mut func_evals = 1;
        let mut lambda = self.config.initial_lambda;
        let mut iterations = 0;

        let finish = |params: Array1<f64>,
                      cost: f64,
                      iterations: usize,
                      func_evals: usize,
                      status: ConvergenceStatus,
                      message: String|
         -> Result<OptimizeResult> {
            debug!(iterations, func_evals, cost, ?status, "levenberg-marquardt finished");
            Ok(OptimizeResult {
                params,
                cost,
                iterations,
                func_evals,
                status,
                message,
            })
        };

        loop {
            if control.is_cancelled() {
                return finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::Cancelled,
                    "cancelled".to_string(),
                );
            }
            if iterations >= max_iterations {
                return finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::MaxIterationsReached,
                    format!("Maximum iterations ({}) reached", max_iterations),
                );
            }

            let jacobian = problem.jacobian(&params)?;
            func_evals += n_params;
            let j = ndarray_to_nalgebra(&jacobian);
            let r = ndarray_vec_to_nalgebra(&residuals);

            let jtj = j.transpose() * &j;
            let g = j.transpose() * &r;

            let gradient_norm = g.amax();
            if gradient_norm < self.config.gtol {
                return finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::GradientConvergence,
                    format!(
                        "Gradient convergence: |g| = {:.2e} < {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                );
            }

            // Search for an acceptable damping
            let accepted = loop {
                if control.is_cancelled() {
                    break None;
                }
                let step = match self.calculate_step(&jtj, &g, lambda) {
                    Some(step) => step,
                    None => {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            break None;
                        }
                        continue;
                    }
                };

                let new_params = &params + &nalgebra_vec_to_ndarray(&step);
                func_evals += 1;
                let new_cost = cost_or_infinity(problem, &new_params)?;
                if new_cost < cost {
                    break Some((new_params, new_cost));
                }
                lambda *= self.config.lambda_up_factor;
                if lambda > self.config.max_lambda {
                    break None;
                }
            };

            let Some((new_params, new_cost)) = accepted else {
                if control.is_cancelled() {
                    continue;
                }
                // No downhill step exists at any damping: the current point is a minimum
                return finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::FunctionValueConvergence,
                    "No further reduction in cost is possible".to_string(),
                );
            };

            iterations += 1;
            let status =
                criteria.check(&params, &new_params, cost, new_cost, gradient_norm, iterations);
            params = new_params;
            cost = new_cost;
            residuals = problem.eval(&params)?;
            func_evals += 1;
            lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);

            match status {
                ConvergenceStatus::Running => (),
                ConvergenceStatus::MaxIterationsReached => continue,
                status => {
                    let message = match status {
                        ConvergenceStatus::ParameterConvergence => "Parameter convergence",
                        _ => "Cost convergence",
                    };
                    return finish(
                        params,
                        cost,
                        iterations,
                        func_evals,
                        status,
                        message.to_string(),
                    );
                }
            }
        }
    }

    /// Calculate the Levenberg-Marquardt step.
    ///
    /// Solves (JᵀJ + λ diag(JᵀJ)) δ = −Jᵀr.
    ///
    /// # Returns
    ///
    /// * The step, or None if the system is singular
    fn calculate_step(
        &self,
        jtj: &DMatrix<f64>,
        g: &DVector<f64>,
        lambda: f64,
    ) -> Option<DVector<f64>> {
        let mut a = jtj.clone();
        for i in 0..a.nrows() {
            a[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
        }
        let rhs = -g;

        let step = match self.config.decomposition_method {
            DecompositionMethod::Cholesky => a.cholesky().map(|c| c.solve(&rhs)),
            DecompositionMethod::LU => a.lu().solve(&rhs),
            DecompositionMethod::Auto => match a.clone().cholesky() {
                Some(c) => Some(c.solve(&rhs)),
                None => a.lu().solve(&rhs),
            },
        }?;

        step.iter().all(|x| x.is_finite()).then_some(step)
    }
}
