//! Engine following the lmfit conventions.
//!
//! `leastsq` (Levenberg-Marquardt, the default) reports MINPACK-style codes;
//! the scalar minimizers `nelder` and `differential_evolution` report
//! scipy-style codes. Standard errors are scaled by the reduced chi-square.

use tracing::info;

use super::{finish_fit, FitEngine, FitProblem, RawEngineOutput};
use crate::control::RunControl;
use crate::convergence::ConvergenceStatus;
use crate::error::{Result, SasFitError};
use crate::global_opt::DifferentialEvolution;
use crate::lm::LevenbergMarquardt;
use crate::simplex::NelderMead;

/// `leastsq` codes.
pub mod leastsq {
    /// Improper input or internal error.
    pub const ERROR: i32 = 0;
    /// Relative reduction in the sum of squares is at most ftol.
    pub const FTOL: i32 = 1;
    /// Relative error between two iterates is at most xtol.
    pub const XTOL: i32 = 2;
    /// Both ftol and xtol hold.
    pub const FTOL_XTOL: i32 = 3;
    /// The gradient is orthogonal to the residuals to within gtol.
    pub const GTOL: i32 = 4;
    /// Too many function evaluations.
    pub const MAXFEV: i32 = 5;
}

/// Codes of the scalar minimizers.
pub mod scalar {
    pub const SUCCESS: i32 = 0;
    pub const MAXITER: i32 = 1;
    pub const ERROR: i32 = 3;
}

/// Fit aborted at a cancellation checkpoint, for every method.
pub const ABORTED: i32 = -1;

const METHODS: &[&str] = &["leastsq", "nelder", "differential_evolution"];

#[derive(Debug, Clone, Copy, Default)]
pub struct LmfitEngine;

fn leastsq_code(status: Option<ConvergenceStatus>) -> i32 {
    match status {
        Some(ConvergenceStatus::FunctionValueConvergence) => leastsq::FTOL,
        Some(ConvergenceStatus::ParameterConvergence) => leastsq::XTOL,
        Some(ConvergenceStatus::GradientConvergence) => leastsq::GTOL,
        Some(ConvergenceStatus::MaxIterationsReached) => leastsq::MAXFEV,
        Some(ConvergenceStatus::Cancelled) => ABORTED,
        _ => leastsq::ERROR,
    }
}

fn scalar_code(status: Option<ConvergenceStatus>) -> i32 {
    match status {
        Some(s) if s.is_converged() => scalar::SUCCESS,
        Some(ConvergenceStatus::MaxIterationsReached) => scalar::MAXITER,
        Some(ConvergenceStatus::Cancelled) => ABORTED,
        _ => scalar::ERROR,
    }
}

impl FitEngine for LmfitEngine {
    fn name(&self) -> &'static str {
        "lmfit"
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn default_method(&self) -> &'static str {
        "leastsq"
    }

    fn validate(&self, method: &str, problem: &FitProblem) -> Result<()> {
        if method != "differential_evolution" {
            return Ok(());
        }
        // The search box must be finite for every varied parameter
        for spec in problem.model().parameters().varying() {
            if !spec.bounds().is_finite() {
                return Err(SasFitError::InvalidBounds {
                    name: spec.name.clone(),
                    reason: "differential_evolution requires finite min and max".to_string(),
                });
            }
        }
        Ok(())
    }

    fn fit(
        &self,
        method: &str,
        problem: &FitProblem,
        control: &RunControl,
    ) -> Result<RawEngineOutput> {
        self.validate(method, problem)?;
        let initial = problem.initial_internal()?;
        info!(engine = "lmfit", method, free = problem.free_count(), "starting fit");

        match method {
            "leastsq" => {
                let outcome = LevenbergMarquardt::new().minimize(problem, initial, control);
                finish_fit(self.name(), method, problem, outcome, leastsq_code, true)
            }
            "nelder" => {
                let outcome = NelderMead::new().minimize(problem, initial, control);
                finish_fit(self.name(), method, problem, outcome, scalar_code, true)
            }
            "differential_evolution" => {
                let bounds = problem.internal_bounds(&initial);
                let outcome =
                    DifferentialEvolution::new().minimize(problem, &initial, &bounds, control);
                finish_fit(self.name(), method, problem, outcome, scalar_code, true)
            }
            other => Err(SasFitError::UnknownMethod {
                engine: self.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}
