//! Fitting engines.
//!
//! An engine takes a [`FitProblem`] and a method name and returns its native
//! [`RawEngineOutput`]: status code, best values, standard errors and chi-square.
//! Two engines are built in, mirroring the conventions of the bumps and lmfit
//! packages; the result normalizer knows how to read both.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use tracing::warn;

use crate::composition::CompositeModel;
use crate::control::RunControl;
use crate::convergence::{ConvergenceStatus, OptimizeResult};
use crate::data::Dataset;
use crate::error::{Result, SasFitError};
use crate::parameters::BoundsTransform;
use crate::problem::Problem;
use crate::uncertainty::standard_errors;
use crate::utils::finite_difference::{self, Difference};

pub mod bumps;
pub mod lmfit;

pub use bumps::BumpsEngine;
pub use lmfit::LmfitEngine;

/// A composite model bound to a dataset, seen by the optimizers in internal
/// (unbounded) coordinates of its varying parameters.
#[derive(Debug, Clone)]
pub struct FitProblem {
    model: Arc<CompositeModel>,
    data: Arc<Dataset>,
    base: Vec<f64>,
    varying: Vec<usize>,
    transforms: Vec<BoundsTransform>,
}

impl FitProblem {
    pub fn new(model: Arc<CompositeModel>, data: Arc<Dataset>) -> Self {
        let base = model.values();
        let (varying, transforms): (Vec<usize>, Vec<BoundsTransform>) = model
            .parameters()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.vary)
            .map(|(i, p)| (i, BoundsTransform::new(p.bounds())))
            .unzip();
        Self {
            model,
            data,
            base,
            varying,
            transforms,
        }
    }

    pub fn model(&self) -> &CompositeModel {
        &self.model
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    /// Number of varying parameters.
    pub fn free_count(&self) -> usize {
        self.varying.len()
    }

    /// Names of the varying parameters, in optimizer order.
    pub fn varying_names(&self) -> Vec<String> {
        let specs: Vec<_> = self.model.parameters().iter().collect();
        self.varying.iter().map(|&i| specs[i].name.clone()).collect()
    }

    /// Starting values of the varying parameters.
    pub fn initial_external(&self) -> Array1<f64> {
        self.varying.iter().map(|&i| self.base[i]).collect()
    }

    /// Starting point in internal coordinates.
    pub fn initial_internal(&self) -> Result<Array1<f64>> {
        let names = self.varying_names();
        self.varying
            .iter()
            .zip(&self.transforms)
            .zip(&names)
            .map(|((&i, t), name)| {
                t.to_internal(self.base[i]).map_err(|_| SasFitError::OutOfBounds {
                    name: name.clone(),
                    value: self.base[i],
                    min: t.bounds().min,
                    max: t.bounds().max,
                })
            })
            .collect()
    }

    /// Map internal coordinates to bounded parameter values.
    pub fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        internal
            .iter()
            .zip(&self.transforms)
            .map(|(&u, t)| t.to_external(u))
            .collect()
    }

    /// Full parameter vector with the varying entries replaced.
    pub fn full_values(&self, varying: &Array1<f64>) -> Vec<f64> {
        let mut values = self.base.clone();
        for (&i, &v) in self.varying.iter().zip(varying.iter()) {
            values[i] = v;
        }
        values
    }

    /// Search box in internal coordinates for population-based methods.
    ///
    /// Doubly bounded parameters span one period of the sine transform; all
    /// others get a box around the start that scales with its magnitude.
    pub fn internal_bounds(&self, initial: &Array1<f64>) -> Vec<(f64, f64)> {
        self.transforms
            .iter()
            .zip(initial.iter())
            .map(|(t, &u0)| {
                let bounds = t.bounds();
                if bounds.has_lower_bound() && bounds.has_upper_bound() {
                    (-FRAC_PI_2, FRAC_PI_2)
                } else {
                    let half_width = (2.0 * u0.abs()).max(1.0);
                    (u0 - half_width, u0 + half_width)
                }
            })
            .collect()
    }

    /// Residuals (model - I) / dI at a full parameter vector.
    pub fn weighted_residuals(&self, values: &[f64]) -> Result<Array1<f64>> {
        let model = self.model.evaluate(self.data.q(), values)?;
        let residuals: Array1<f64> = model
            .iter()
            .zip(self.data.intensity())
            .zip(self.data.error())
            .map(|((m, i), di)| (m - i) / di)
            .collect();
        if residuals.iter().all(|r| r.is_finite()) {
            Ok(residuals)
        } else {
            Err(SasFitError::FunctionEvaluation(format!(
                "{}: non-finite residual",
                self.model.name()
            )))
        }
    }

    /// The same problem over bounded parameter values, used for standard errors.
    pub fn external(&self) -> ExternalView<'_> {
        ExternalView(self)
    }
}

impl Problem for FitProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.weighted_residuals(&self.full_values(&self.to_external(params)))
    }

    fn parameter_count(&self) -> usize {
        self.varying.len()
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }
}

/// A [`FitProblem`] evaluated directly at bounded parameter values.
#[derive(Debug, Clone, Copy)]
pub struct ExternalView<'a>(&'a FitProblem);

impl Problem for ExternalView<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.0.weighted_residuals(&self.0.full_values(params))
    }

    fn parameter_count(&self) -> usize {
        self.0.varying.len()
    }

    fn residual_count(&self) -> usize {
        self.0.data.len()
    }
}

/// One fitted parameter as reported by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawParameter {
    pub name: String,
    pub value: f64,
    pub stderr: Option<f64>,
}

/// Engine-native fit output, persisted as `raw_output.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEngineOutput {
    pub engine: String,
    pub method: String,
    /// Engine- and method-specific status code
    pub status_code: i32,
    pub message: String,
    /// Varying parameters only
    pub parameters: Vec<RawParameter>,
    pub chisq: f64,
    pub n_points: usize,
    pub iterations: usize,
    pub func_evals: usize,
    /// Stopped at a cancellation checkpoint
    pub aborted: bool,
}

/// A nonlinear least-squares backend.
pub trait FitEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Method names this engine accepts.
    fn methods(&self) -> &'static [&'static str];

    fn default_method(&self) -> &'static str;

    /// Reject problems the method cannot run before any workspace is created.
    fn validate(&self, _method: &str, _problem: &FitProblem) -> Result<()> {
        Ok(())
    }

    /// Run `method` to completion, cancellation or its iteration limit.
    fn fit(
        &self,
        method: &str,
        problem: &FitProblem,
        control: &RunControl,
    ) -> Result<RawEngineOutput>;

    /// The requested method, or the default when none is given.
    fn resolve_method(&self, method: Option<&str>) -> Result<&'static str> {
        match method.map(str::trim).filter(|m| !m.is_empty()) {
            None => Ok(self.default_method()),
            Some(requested) => self
                .methods()
                .iter()
                .find(|m| **m == requested)
                .copied()
                .ok_or_else(|| SasFitError::UnknownMethod {
                    engine: self.name().to_string(),
                    method: requested.to_string(),
                }),
        }
    }
}

/// Engines available to the dispatcher, keyed by name.
#[derive(Clone)]
pub struct EngineRegistry {
    engines: BTreeMap<&'static str, Arc<dyn FitEngine>>,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.engines.keys()).finish()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: BTreeMap::new(),
        }
    }

    /// The bumps-style and lmfit-style engines.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BumpsEngine));
        registry.register(Arc::new(LmfitEngine));
        registry
    }

    pub fn register(&mut self, engine: Arc<dyn FitEngine>) {
        self.engines.insert(engine.name(), engine);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn FitEngine>> {
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| SasFitError::UnknownEngine(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.engines.keys().copied().collect()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Assemble engine output from a minimizer outcome.
///
/// `code` maps a final status to the engine's status code, with `None` standing
/// for a minimizer that failed outright. Standard errors come from the Jacobian
/// of the weighted residuals at the best values, scaled by the reduced
/// chi-square when `scale_covariance` is set.
pub(crate) fn finish_fit(
    engine: &str,
    method: &str,
    problem: &FitProblem,
    outcome: Result<OptimizeResult>,
    code: impl Fn(Option<ConvergenceStatus>) -> i32,
    scale_covariance: bool,
) -> Result<RawEngineOutput> {
    let names = problem.varying_names();
    let n_points = problem.data().len();

    let result = match outcome {
        Ok(result) => result,
        Err(e @ (SasFitError::FunctionEvaluation(_) | SasFitError::OptimizerFailure(_))) => {
            warn!(engine, method, error = %e, "minimizer failed");
            let start = problem.initial_external();
            return Ok(RawEngineOutput {
                engine: engine.to_string(),
                method: method.to_string(),
                status_code: code(None),
                message: e.to_string(),
                parameters: names
                    .into_iter()
                    .zip(start.iter())
                    .map(|(name, &value)| RawParameter {
                        name,
                        value,
                        stderr: None,
                    })
                    .collect(),
                chisq: f64::NAN,
                n_points,
                iterations: 0,
                func_evals: 0,
                aborted: false,
            });
        }
        Err(e) => return Err(e),
    };

    let values = problem.to_external(&result.params);
    let aborted = result.status == ConvergenceStatus::Cancelled;
    let chisq = result.cost;

    let stderr = if aborted || names.is_empty() {
        vec![None; names.len()]
    } else {
        let dof = n_points as f64 - names.len() as f64;
        let scale = if scale_covariance && dof > 0.0 { chisq / dof } else { 1.0 };
        match finite_difference::jacobian(&problem.external(), &values, Difference::Central) {
            Ok(jacobian) => standard_errors(jacobian.view(), scale),
            Err(e) => {
                warn!(
                    engine,
                    method,
                    error = %e,
                    "could not evaluate Jacobian for standard errors"
                );
                vec![None; names.len()]
            }
        }
    };

    Ok(RawEngineOutput {
        engine: engine.to_string(),
        method: method.to_string(),
        status_code: code(Some(result.status)),
        message: result.message,
        parameters: names
            .into_iter()
            .zip(values.iter())
            .zip(stderr)
            .map(|((name, &value), stderr)| RawParameter { name, value, stderr })
            .collect(),
        chisq,
        n_points,
        iterations: result.iterations,
        func_evals: result.func_evals,
        aborted,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A synthetic sphere dataset shared by the engine tests.

    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::composition::{compose, CompositionSpec};
    use crate::parameters::ParameterOverride;

    /// Noise-free sphere data at radius 40 and scale 0.5, fitted from radius 37.
    pub fn sphere_problem() -> FitProblem {
        let catalog = ModelCatalog::builtin();
        let q: Vec<f64> = (0..60).map(|i| 0.005 * 1.06f64.powi(i)).collect();

        let truth = compose(&catalog, &CompositionSpec::new("sphere")).unwrap();
        let mut values = truth.values();
        let names: Vec<_> = truth.parameters().names().iter().map(|s| s.to_string()).collect();
        for (name, value) in [("radius", 40.0), ("scale", 0.5), ("background", 0.001)] {
            let i = names.iter().position(|n| n == name).unwrap();
            values[i] = value;
        }
        let intensity = truth.evaluate(&q, &values).unwrap();
        let error: Vec<f64> = intensity.iter().map(|i| 0.02 * i).collect();
        let data = Dataset::new(q, intensity, error).unwrap();

        let mut spec = CompositionSpec::new("sphere");
        spec.param_overrides
            .insert("radius".to_string(), ParameterOverride::fitted(37.0, 1.0, 100.0));
        spec.param_overrides
            .insert("scale".to_string(), ParameterOverride::fitted(1.0, 0.01, 10.0));
        spec.param_overrides
            .insert("background".to_string(), ParameterOverride::value(0.001));
        let model = compose(&catalog, &spec).unwrap();
        FitProblem::new(Arc::new(model), Arc::new(data))
    }
}
