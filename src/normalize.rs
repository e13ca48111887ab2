//! Mapping engine-native output onto the stable fit result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::composition::CompositeModel;
use crate::engine::{bumps, lmfit, RawEngineOutput};
use crate::error::{Result, SasFitError};

/// Outcome of a fit, independent of the engine that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    MaxIterations,
    Error,
}

/// One parameter of the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParameter {
    pub name: String,
    pub value: f64,
    /// Standard error; `None` for fixed parameters or a singular covariance
    pub uncertainty: Option<f64>,
    pub vary: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub unit: String,
}

/// Files a run leaves in its workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub workspace: Option<PathBuf>,
    pub problem: Option<PathBuf>,
    pub raw_output: Option<PathBuf>,
    pub plot: Option<PathBuf>,
}

/// The normalized result of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub run_id: String,
    pub model: String,
    pub engine: String,
    pub method: String,
    pub status: FitStatus,
    pub message: String,
    pub parameters: Vec<FittedParameter>,
    pub chisq: f64,
    pub reduced_chisq: f64,
    pub n_points: usize,
    pub n_free: usize,
    pub iterations: usize,
    pub func_evals: usize,
    pub artifacts: Artifacts,
}

impl FitResult {
    pub fn parameter(&self, name: &str) -> Option<&FittedParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Interpret an engine status code.
///
/// Codes outside the engine's documented table are an error, never a guess.
pub fn map_status(engine: &str, method: &str, code: i32) -> Result<FitStatus> {
    let status = match (engine, method) {
        ("bumps", _) => match code {
            bumps::CONVERGED => Some(FitStatus::Converged),
            bumps::STEP_LIMIT => Some(FitStatus::MaxIterations),
            bumps::CANCELLED | bumps::FAILED => Some(FitStatus::Error),
            _ => None,
        },
        ("lmfit", "leastsq") => match code {
            lmfit::leastsq::FTOL..=lmfit::leastsq::GTOL => Some(FitStatus::Converged),
            lmfit::leastsq::MAXFEV => Some(FitStatus::MaxIterations),
            lmfit::leastsq::ERROR | lmfit::ABORTED => Some(FitStatus::Error),
            _ => None,
        },
        ("lmfit", _) => match code {
            lmfit::scalar::SUCCESS => Some(FitStatus::Converged),
            // scipy also reports an exhausted evaluation budget as 2
            lmfit::scalar::MAXITER | 2 => Some(FitStatus::MaxIterations),
            lmfit::scalar::ERROR | lmfit::ABORTED => Some(FitStatus::Error),
            _ => None,
        },
        _ => None,
    };
    status.ok_or_else(|| {
        SasFitError::AmbiguousOutput(format!(
            "status code {code} is not defined for {engine}/{method}"
        ))
    })
}

/// Build the fit result for `model` from the engine's raw output.
///
/// Varied parameters take the engine's best value and standard error; fixed
/// parameters pass through with no uncertainty. Linked parameters are not part
/// of the model's parameter set and so never appear.
///
/// # Errors
///
/// * `Cancelled` if the engine stopped at a cancellation checkpoint
/// * `OptimizerFailure` if the status code maps to an error
/// * `AmbiguousOutput` for unknown codes, missing or extra parameters, or a
///   non-finite chi-square
/// * `NonPositiveDof` when there are no more points than free parameters
pub fn normalize(raw: &RawEngineOutput, model: &CompositeModel, run_id: &str) -> Result<FitResult> {
    if raw.aborted {
        return Err(SasFitError::Cancelled);
    }
    let status = map_status(&raw.engine, &raw.method, raw.status_code)?;
    if status == FitStatus::Error {
        return Err(SasFitError::OptimizerFailure(format!(
            "{}/{} reported status {}: {}",
            raw.engine, raw.method, raw.status_code, raw.message
        )));
    }
    if !raw.chisq.is_finite() {
        return Err(SasFitError::AmbiguousOutput(format!("chi-square is {}", raw.chisq)));
    }

    let n_free = model.parameters().varying_count();
    if raw.n_points <= n_free {
        return Err(SasFitError::NonPositiveDof {
            points: raw.n_points,
            free: n_free,
        });
    }
    let reduced_chisq = raw.chisq / (raw.n_points - n_free) as f64;

    if let Some(extra) = raw
        .parameters
        .iter()
        .find(|p| !model.parameters().get(&p.name).is_some_and(|spec| spec.vary))
    {
        return Err(SasFitError::AmbiguousOutput(format!(
            "engine reported '{}', which is not a varied parameter",
            extra.name
        )));
    }

    let parameters = model
        .parameters()
        .iter()
        .map(|spec| {
            if !spec.vary {
                return Ok(FittedParameter {
                    name: spec.name.clone(),
                    value: spec.value,
                    uncertainty: None,
                    vary: false,
                    unit: spec.unit.clone(),
                });
            }
            let fitted = raw
                .parameters
                .iter()
                .find(|p| p.name == spec.name)
                .ok_or_else(|| {
                    SasFitError::AmbiguousOutput(format!("no fitted value for '{}'", spec.name))
                })?;
            if !fitted.value.is_finite() {
                return Err(SasFitError::AmbiguousOutput(format!(
                    "fitted value for '{}' is {}",
                    spec.name, fitted.value
                )));
            }
            let uncertainty = match fitted.stderr {
                Some(e) if e.is_finite() => Some(e),
                other => {
                    warn!(parameter = %spec.name, stderr = ?other, "no usable standard error");
                    None
                }
            };
            Ok(FittedParameter {
                name: spec.name.clone(),
                value: fitted.value,
                uncertainty,
                vary: true,
                unit: spec.unit.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(run_id, ?status, chisq = raw.chisq, reduced_chisq, "normalized engine output");

    Ok(FitResult {
        run_id: run_id.to_string(),
        model: model.name(),
        engine: raw.engine.clone(),
        method: raw.method.clone(),
        status,
        message: raw.message.clone(),
        parameters,
        chisq: raw.chisq,
        reduced_chisq,
        n_points: raw.n_points,
        n_free,
        iterations: raw.iterations,
        func_evals: raw.func_evals,
        artifacts: Artifacts::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::composition::{compose, CompositionSpec};
    use crate::engine::RawParameter;
    use crate::parameters::ParameterOverride;
    use approx::assert_relative_eq;

    fn cylinder() -> CompositeModel {
        let mut spec = CompositionSpec::new("cylinder");
        spec.param_overrides
            .insert("radius".to_string(), ParameterOverride::fitted(20.0, 1.0, 200.0));
        spec.param_overrides
            .insert("length".to_string(), ParameterOverride::fitted(400.0, 10.0, 4000.0));
        compose(&ModelCatalog::builtin(), &spec).unwrap()
    }

    fn raw(code: i32) -> RawEngineOutput {
        RawEngineOutput {
            engine: "bumps".to_string(),
            method: "amoeba".to_string(),
            status_code: code,
            message: "done".to_string(),
            parameters: vec![
                RawParameter {
                    name: "radius".to_string(),
                    value: 21.0,
                    stderr: Some(0.5),
                },
                RawParameter {
                    name: "length".to_string(),
                    value: 390.0,
                    stderr: Some(f64::NAN),
                },
            ],
            chisq: 98.0,
            n_points: 100,
            iterations: 40,
            func_evals: 80,
            aborted: false,
        }
    }

    #[test]
    fn test_normalize_success() {
        let result = normalize(&raw(bumps::CONVERGED), &cylinder(), "run-1").unwrap();
        assert_eq!(result.status, FitStatus::Converged);
        assert_eq!(result.n_free, 2);
        assert_relative_eq!(result.reduced_chisq, 1.0);

        let radius = result.parameter("radius").unwrap();
        assert_eq!(radius.value, 21.0);
        assert_eq!(radius.uncertainty, Some(0.5));
        assert_eq!(result.parameter("length").unwrap().uncertainty, None);

        let sld = result.parameter("sld").unwrap();
        assert!(!sld.vary);
        assert_eq!(sld.uncertainty, None);
        assert_eq!(result.parameters.len(), 6);
    }

    #[test]
    fn test_status_tables() {
        assert_eq!(map_status("bumps", "amoeba", 1).unwrap(), FitStatus::MaxIterations);
        assert_eq!(map_status("lmfit", "leastsq", 3).unwrap(), FitStatus::Converged);
        assert_eq!(map_status("lmfit", "leastsq", 0).unwrap(), FitStatus::Error);
        assert_eq!(map_status("lmfit", "nelder", 0).unwrap(), FitStatus::Converged);
        assert_eq!(map_status("lmfit", "nelder", 3).unwrap(), FitStatus::Error);
        assert!(matches!(map_status("bumps", "lm", 7), Err(SasFitError::AmbiguousOutput(_))));
        assert!(matches!(map_status("sasview", "lm", 0), Err(SasFitError::AmbiguousOutput(_))));
    }

    #[test]
    fn test_error_status_is_never_success() {
        let err = normalize(&raw(bumps::FAILED), &cylinder(), "run-1").unwrap_err();
        assert!(matches!(err, SasFitError::OptimizerFailure(_)));

        let mut aborted = raw(bumps::CANCELLED);
        aborted.aborted = true;
        assert!(matches!(normalize(&aborted, &cylinder(), "r"), Err(SasFitError::Cancelled)));
    }

    #[test]
    fn test_ambiguous_output() {
        let mut missing = raw(bumps::CONVERGED);
        missing.parameters.pop();
        assert!(matches!(
            normalize(&missing, &cylinder(), "r"),
            Err(SasFitError::AmbiguousOutput(_))
        ));

        let mut extra = raw(bumps::CONVERGED);
        extra.parameters[1].name = "sld".to_string();
        assert!(matches!(
            normalize(&extra, &cylinder(), "r"),
            Err(SasFitError::AmbiguousOutput(_))
        ));

        let mut nan = raw(bumps::CONVERGED);
        nan.chisq = f64::NAN;
        assert!(matches!(normalize(&nan, &cylinder(), "r"), Err(SasFitError::AmbiguousOutput(_))));
    }

    #[test]
    fn test_non_positive_dof() {
        let mut few = raw(bumps::CONVERGED);
        few.n_points = 2;
        assert!(matches!(
            normalize(&few, &cylinder(), "r"),
            Err(SasFitError::NonPositiveDof { points: 2, free: 2 })
        ));
    }
}
