//! Differential Evolution algorithm for global optimization.
//!
//! This module implements the Differential Evolution algorithm, a population-based
//! stochastic function minimizer that is particularly effective for global optimization.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::control::RunControl;
use crate::convergence::{ConvergenceStatus, OptimizeResult};
use crate::error::{Result, SasFitError};
use crate::global_opt::{clip_to_bounds, create_population, evaluate_population};
use crate::problem::{cost_or_infinity, Problem};

/// Differential Evolution algorithm for global optimization.
///
/// Differential Evolution is a population-based stochastic function minimizer
/// that is effective for global optimization. It uses vector differences to
/// perturb the population.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    /// Population size multiplier (population size = multiplier * max(parameter count, 4))
    pub pop_size_multiplier: usize,

    /// Differential weight (F) in range [0, 2]
    pub differential_weight: f64,

    /// Crossover probability (CR) in range [0, 1]
    pub crossover_prob: f64,

    /// Strategy for creating candidate solutions
    pub strategy: DEStrategy,

    /// Maximum number of generations. Default: 1000
    pub max_iterations: usize,

    /// Relative spread of the population costs at which to stop. Default: 0.01
    pub tol: f64,

    /// Absolute spread of the population costs at which to stop. Default: 0.0
    pub atol: f64,

    /// Seed for reproducible runs; entropy-seeded when absent
    pub seed: Option<u64>,
}

/// Strategies for creating candidate solutions in Differential Evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DEStrategy {
    /// DE/rand/1: x_r1 + F * (x_r2 - x_r3)
    Rand1,

    /// DE/best/1: x_best + F * (x_r1 - x_r2)
    Best1,

    /// DE/current-to-best/1: x_i + F * (x_best - x_i) + F * (x_r1 - x_r2)
    CurrentToBest1,
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self {
            pop_size_multiplier: 15,
            differential_weight: 0.8,
            crossover_prob: 0.9,
            strategy: DEStrategy::Best1,
            max_iterations: 1000,
            tol: 0.01,
            atol: 0.0,
            seed: None,
        }
    }
}

impl DifferentialEvolution {
    /// Create a new DifferentialEvolution optimizer with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new DifferentialEvolution optimizer with custom parameters.
    ///
    /// # Arguments
    ///
    /// * `pop_size_multiplier` - Population size multiplier
    /// * `differential_weight` - Differential weight (F) in range [0, 2]
    /// * `crossover_prob` - Crossover probability (CR) in range [0, 1]
    /// * `strategy` - Strategy for creating candidate solutions
    pub fn with_params(
        pop_size_multiplier: usize,
        differential_weight: f64,
        crossover_prob: f64,
        strategy: DEStrategy,
    ) -> Self {
        Self {
            pop_size_multiplier,
            differential_weight,
            crossover_prob,
            strategy,
            ..Self::default()
        }
    }

    /// Set the maximum number of generations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Create a trial vector using the specified strategy.
    ///
    /// # Arguments
    ///
    /// * `target_idx` - Index of the target vector
    /// * `best_idx` - Index of the current best vector
    /// * `population` - Current population
    /// * `bounds` - Parameter bounds
    /// * `rng` - Random number generator
    ///
    /// # Returns
    ///
    /// * A new trial vector
    fn create_trial_vector(
        &self,
        target_idx: usize,
        best_idx: usize,
        population: &[Array1<f64>],
        bounds: &[(f64, f64)],
        rng: &mut impl Rng,
    ) -> Array1<f64> {
        let n_params = population[target_idx].len();
        let f = self.differential_weight;

        let mut available: Vec<usize> = (0..population.len())
            .filter(|&i| i != target_idx && (self.strategy == DEStrategy::Rand1 || i != best_idx))
            .collect();
        available.shuffle(rng);

        let mut trial = match self.strategy {
            DEStrategy::Rand1 => {
                let (r1, r2, r3) = (available[0], available[1], available[2]);
                &population[r1] + &((&population[r2] - &population[r3]) * f)
            }
            DEStrategy::Best1 => {
                let (r1, r2) = (available[0], available[1]);
                &population[best_idx] + &((&population[r1] - &population[r2]) * f)
            }
            DEStrategy::CurrentToBest1 => {
                let (r1, r2) = (available[0], available[1]);
                let current = &population[target_idx];
                current
                    + &((&population[best_idx] - current) * f)
                    + &((&population[r1] - &population[r2]) * f)
            }
        };

        // Binomial crossover with the target vector
        let target = &population[target_idx];
        let j_rand = rng.gen_range(0..n_params);
        for j in 0..n_params {
            if rng.gen::<f64>() > self.crossover_prob && j != j_rand {
                trial[j] = target[j];
            }
        }

        clip_to_bounds(&trial, bounds)
    }

    /// Run the search from `initial` inside `bounds`.
    ///
    /// The starting point is kept as one member of the first generation so the
    /// result is never worse than it.
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial: &Array1<f64>,
        bounds: &[(f64, f64)],
        control: &RunControl,
    ) -> Result<OptimizeResult> {
        let n_params = problem.parameter_count();
        if n_params != bounds.len() || n_params != initial.len() {
            return Err(SasFitError::DimensionMismatch(format!(
                "Expected {} parameters and bounds, got {} and {}",
                n_params,
                initial.len(),
                bounds.len()
            )));
        }
        if n_params == 0 {
            let cost = cost_or_infinity(problem, initial)?;
            return Ok(OptimizeResult {
                params: initial.clone(),
                cost,
                iterations: 0,
                func_evals: 1,
                status: ConvergenceStatus::FunctionValueConvergence,
                message: "No free parameters".to_string(),
            });
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let max_iterations = control.iteration_limit(self.max_iterations);

        let pop_size = (self.pop_size_multiplier * n_params.max(4)).max(5);
        let mut population = create_population(initial, bounds, pop_size, &mut rng);
        let mut costs = evaluate_population(problem, &population)?;
        let mut func_evals = population.len();
        let mut best_idx = best_index(&costs);

        let mut iterations = 0;
        let status = loop {
            if control.is_cancelled() {
                break ConvergenceStatus::Cancelled;
            }
            if self.population_converged(&costs) {
                break ConvergenceStatus::FunctionValueConvergence;
            }
            if iterations >= max_iterations {
                break ConvergenceStatus::MaxIterationsReached;
            }

            for i in 0..pop_size {
                let trial = self.create_trial_vector(i, best_idx, &population, bounds, &mut rng);
                let trial_cost = cost_or_infinity(problem, &trial)?;
                func_evals += 1;

                if trial_cost <= costs[i] {
                    population[i] = trial;
                    costs[i] = trial_cost;
                    if trial_cost < costs[best_idx] {
                        best_idx = i;
                    }
                }
            }

            iterations += 1;
        };

        let best_cost = costs[best_idx];
        if !best_cost.is_finite() {
            return Err(SasFitError::FunctionEvaluation(
                "no population member could be evaluated".to_string(),
            ));
        }
        let message = match status {
            ConvergenceStatus::FunctionValueConvergence => {
                "Population cost spread fell below tolerance".to_string()
            }
            ConvergenceStatus::Cancelled => "cancelled".to_string(),
            _ => format!("Maximum number of generations ({}) reached", max_iterations),
        };
        debug!(
            iterations,
            func_evals,
            cost = best_cost,
            ?status,
            "differential evolution finished"
        );

        Ok(OptimizeResult {
            params: population.swap_remove(best_idx),
            cost: best_cost,
            iterations,
            func_evals,
            status,
            message,
        })
    }

    /// Stop once the population costs agree to within `atol + tol * |mean|`.
    fn population_converged(&self, costs: &[f64]) -> bool {
        if costs.iter().any(|c| !c.is_finite()) {
            return false;
        }
        let n = costs.len() as f64;
        let mean = costs.iter().sum::<f64>() / n;
        let std = (costs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n).sqrt();
        std <= self.atol + self.tol * mean.abs()
    }
}

fn best_index(costs: &[f64]) -> usize {
    costs
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
