//! Engine following the bumps conventions.
//!
//! Methods `amoeba` (Nelder-Mead, the default), `lm` and `de`. Standard errors
//! are reported unscaled, from the data uncertainties alone.

use tracing::info;

use super::{finish_fit, FitEngine, FitProblem, RawEngineOutput};
use crate::control::RunControl;
use crate::convergence::ConvergenceStatus;
use crate::error::{Result, SasFitError};
use crate::global_opt::DifferentialEvolution;
use crate::lm::LevenbergMarquardt;
use crate::simplex::NelderMead;

/// Fit finished inside tolerance.
pub const CONVERGED: i32 = 0;
/// Fit stopped at the step limit.
pub const STEP_LIMIT: i32 = 1;
/// Fit stopped at a cancellation checkpoint.
pub const CANCELLED: i32 = 2;
/// Fit raised an error.
pub const FAILED: i32 = -1;

const METHODS: &[&str] = &["amoeba", "lm", "de"];

#[derive(Debug, Clone, Copy, Default)]
pub struct BumpsEngine;

fn status_code(status: Option<ConvergenceStatus>) -> i32 {
    match status {
        Some(s) if s.is_converged() => CONVERGED,
        Some(ConvergenceStatus::MaxIterationsReached) => STEP_LIMIT,
        Some(ConvergenceStatus::Cancelled) => CANCELLED,
        _ => FAILED,
    }
}

impl FitEngine for BumpsEngine {
    fn name(&self) -> &'static str {
        "bumps"
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn default_method(&self) -> &'static str {
        "amoeba"
    }

    fn fit(
        &self,
        method: &str,
        problem: &FitProblem,
        control: &RunControl,
    ) -> Result<RawEngineOutput> {
        let initial = problem.initial_internal()?;
        info!(engine = "bumps", method, free = problem.free_count(), "starting fit");

        let outcome = match method {
            "amoeba" => NelderMead::new().minimize(problem, initial, control),
            "lm" => LevenbergMarquardt::new().minimize(problem, initial, control),
            "de" => {
                let bounds = problem.internal_bounds(&initial);
                DifferentialEvolution::new().minimize(problem, &initial, &bounds, control)
            }
            other => {
                return Err(SasFitError::UnknownMethod {
                    engine: self.name().to_string(),
                    method: other.to_string(),
                })
            }
        };

        finish_fit(self.name(), method, problem, outcome, status_code, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::sphere_problem;
    use approx::assert_relative_eq;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_amoeba_recovers_sphere() {
        let problem = sphere_problem();
        let output = BumpsEngine.fit("amoeba", &problem, &RunControl::default()).unwrap();

        assert_eq!(output.status_code, CONVERGED, "{}", output.message);
        assert_eq!(output.parameters[0].name, "radius");
        assert_relative_eq!(output.parameters[0].value, 40.0, max_relative = 1e-3);
        assert_relative_eq!(output.parameters[1].value, 0.5, max_relative = 1e-2);
        assert!(output.parameters[0].stderr.is_some());
        assert!(!output.aborted);
    }

    #[test]
    fn test_lm_recovers_sphere() {
        let problem = sphere_problem();
        let output = BumpsEngine.fit("lm", &problem, &RunControl::default()).unwrap();

        assert_eq!(output.status_code, CONVERGED, "{}", output.message);
        assert_relative_eq!(output.parameters[0].value, 40.0, max_relative = 1e-4);
        assert!(output.chisq < 1e-6);
    }

    #[test]
    fn test_step_limit_and_cancel_codes() {
        let problem = sphere_problem();
        let control = RunControl::default().with_max_iterations(Some(2));
        let output = BumpsEngine.fit("amoeba", &problem, &control).unwrap();
        assert_eq!(output.status_code, STEP_LIMIT);

        let token = CancellationToken::new();
        token.cancel();
        let output = BumpsEngine.fit("de", &problem, &RunControl::new(token)).unwrap();
        assert_eq!(output.status_code, CANCELLED);
        assert!(output.aborted);
        assert!(output.parameters.iter().all(|p| p.stderr.is_none()));
    }

    #[test]
    fn test_unknown_method() {
        let problem = sphere_problem();
        let err = BumpsEngine.fit("newton", &problem, &RunControl::default()).unwrap_err();
        assert!(matches!(err, SasFitError::UnknownMethod { .. }));
    }
}
