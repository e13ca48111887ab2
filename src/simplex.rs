//! Nelder-Mead downhill simplex ("amoeba").
//!
//! A derivative-free local minimizer over the sum of squared residuals. Points
//! where the model cannot be evaluated score `+inf` and are never kept.

use ndarray::Array1;
use tracing::debug;

use crate::control::RunControl;
use crate::convergence::{ConvergenceStatus, OptimizeResult};
use crate::error::{Result, SasFitError};
use crate::problem::{cost_or_infinity, Problem};

/// Reflection, expansion, contraction and shrink coefficients.
const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;

/// Configuration for the Nelder-Mead simplex.
#[derive(Debug, Clone)]
pub struct NelderMead {
    /// Maximum number of iterations. Default: 4000
    pub max_iterations: usize,

    /// Absolute spread of the simplex vertices at which to stop. Default: 1e-4
    pub xatol: f64,

    /// Absolute spread of the vertex costs at which to stop. Default: 1e-4
    pub fatol: f64,

    /// Relative size of the initial simplex. Default: 0.05
    pub initial_step: f64,

    /// Initial step for coordinates that start at zero. Default: 0.00025
    pub zero_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 4000,
            xatol: 1e-4,
            fatol: 1e-4,
            initial_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

impl NelderMead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerances(mut self, xatol: f64, fatol: f64) -> Self {
        self.xatol = xatol;
        self.fatol = fatol;
        self
    }

    /// Build the starting simplex around `x0`.
    fn initial_simplex(&self, x0: &Array1<f64>) -> Vec<Array1<f64>> {
        let mut simplex = Vec::with_capacity(x0.len() + 1);
        simplex.push(x0.clone());
        for k in 0..x0.len() {
            let mut vertex = x0.clone();
            vertex[k] = if vertex[k] != 0.0 {
                vertex[k] * (1.0 + self.initial_step)
            } else {
                self.zero_step
            };
            simplex.push(vertex);
        }
        simplex
    }

    /// Minimize the sum of squared residuals starting from `initial_params`.
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        control: &RunControl,
    ) -> Result<OptimizeResult> {
        let n = problem.parameter_count();
        if initial_params.len() != n {
            return Err(SasFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n,
                initial_params.len()
            )));
        }
        let max_iterations = control.iteration_limit(self.max_iterations);

        let mut simplex = self.initial_simplex(&initial_params);
        let mut costs = simplex
            .iter()
            .map(|x| cost_or_infinity(problem, x))
            .collect::<Result<Vec<f64>>>()?;
        let mut func_evals = simplex.len();
        if !costs[0].is_finite() {
            return Err(SasFitError::FunctionEvaluation(
                "initial cost is not finite".to_string(),
            ));
        }
        sort_simplex(&mut simplex, &mut costs);

        let mut iterations = 0;
        let status = loop {
            if control.is_cancelled() {
                break ConvergenceStatus::Cancelled;
            }
            if self.has_converged(&simplex, &costs) {
                break ConvergenceStatus::ParameterConvergence;
            }
            if iterations >= max_iterations {
                break ConvergenceStatus::MaxIterationsReached;
            }

            let worst = simplex[n].clone();
            let f_worst = costs[n];
            let centroid = simplex[..n]
                .iter()
                .fold(Array1::zeros(n), |acc, x| acc + x)
                / n as f64;

            let xr = &centroid * (1.0 + RHO) - &worst * RHO;
            let fxr = cost_or_infinity(problem, &xr)?;
            func_evals += 1;

            let mut shrink = false;
            if fxr < costs[0] {
                let xe = &centroid * (1.0 + RHO * CHI) - &worst * (RHO * CHI);
                let fxe = cost_or_infinity(problem, &xe)?;
                func_evals += 1;
                if fxe < fxr {
                    simplex[n] = xe;
                    costs[n] = fxe;
                } else {
                    simplex[n] = xr;
                    costs[n] = fxr;
                }
            } else if fxr < costs[n - 1] {
                simplex[n] = xr;
                costs[n] = fxr;
            } else if fxr < f_worst {
                // Outside contraction
                let xc = &centroid * (1.0 + PSI * RHO) - &worst * (PSI * RHO);
                let fxc = cost_or_infinity(problem, &xc)?;
                func_evals += 1;
                if fxc <= fxr {
                    simplex[n] = xc;
                    costs[n] = fxc;
                } else {
                    shrink = true;
                }
            } else {
                // Inside contraction
                let xcc = &centroid * (1.0 - PSI) + &worst * PSI;
                let fxcc = cost_or_infinity(problem, &xcc)?;
                func_evals += 1;
                if fxcc < f_worst {
                    simplex[n] = xcc;
                    costs[n] = fxcc;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = simplex[0].clone();
                for j in 1..=n {
                    simplex[j] = &best + &((&simplex[j] - &best) * SIGMA);
                    costs[j] = cost_or_infinity(problem, &simplex[j])?;
                }
                func_evals += n;
            }

            sort_simplex(&mut simplex, &mut costs);
            iterations += 1;
        };

        let message = match status {
            ConvergenceStatus::ParameterConvergence => "Simplex converged".to_string(),
            ConvergenceStatus::Cancelled => "cancelled".to_string(),
            _ => format!("Maximum iterations ({}) reached", max_iterations),
        };
        debug!(iterations, func_evals, cost = costs[0], ?status, "nelder-mead finished");

        Ok(OptimizeResult {
            params: simplex.swap_remove(0),
            cost: costs[0],
            iterations,
            func_evals,
            status,
            message,
        })
    }

    fn has_converged(&self, simplex: &[Array1<f64>], costs: &[f64]) -> bool {
        let best = &simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|x| x.iter().zip(best.iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = costs[1..]
            .iter()
            .map(|f| (f - costs[0]).abs())
            .fold(0.0, f64::max);
        x_spread <= self.xatol && f_spread <= self.fatol
    }
}

/// Order vertices by ascending cost.
fn sort_simplex(simplex: &mut Vec<Array1<f64>>, costs: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..costs.len()).collect();
    order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *costs = order.iter().map(|&i| costs[i]).collect();
}
