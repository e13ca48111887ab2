//! The composite fitting model and its evaluation.

use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::catalog::ModelDescriptor;
use crate::error::{Result, SasFitError};
use crate::kernels::{FormFactor, StructureFactor};
use crate::parameters::{Bounds, ParameterSet};
use crate::polydispersity::{PdSettings, PolydispersityConfig};

use super::RadiusEffectiveMode;

/// Conversion from (1e-6 Å⁻²)² Å³ to cm⁻¹.
const INTENSITY_UNITS: f64 = 1.0e-4;

/// Where a structure-factor argument comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum ArgSource {
    /// Index into the composite parameter vector
    Parameter(usize),
    /// Position in the form-factor argument list
    FormArg(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum WidthSource {
    Fixed(f64),
    Parameter(usize),
}

#[derive(Debug, Clone)]
pub(super) struct DispersedArg {
    pub arg: usize,
    pub settings: PdSettings,
    pub width: WidthSource,
    pub limits: Bounds,
}

/// Precomputed mapping from the flat parameter vector to kernel arguments.
#[derive(Debug, Clone)]
pub(super) struct EvalLayout {
    pub form: Arc<dyn FormFactor>,
    pub structure: Option<Arc<dyn StructureFactor>>,
    pub scale: usize,
    pub background: usize,
    pub form_args: Vec<usize>,
    pub structure_args: Vec<ArgSource>,
    pub dispersed: Vec<DispersedArg>,
}

/// A form factor, an optional structure factor and their merged parameters.
///
/// Built by [`compose`](super::compose); evaluation takes values in the order of
/// [`parameters`](CompositeModel::parameters).
#[derive(Debug, Clone, Serialize)]
pub struct CompositeModel {
    #[serde(serialize_with = "descriptor_name")]
    pub(super) form_factor: Arc<ModelDescriptor>,
    #[serde(serialize_with = "optional_descriptor_name")]
    pub(super) structure_factor: Option<Arc<ModelDescriptor>>,
    pub(super) radius_effective_mode: RadiusEffectiveMode,
    pub(super) parameters: ParameterSet,
    pub(super) polydispersity: PolydispersityConfig,
    /// Parameters whose value follows another parameter
    pub(super) linked: Vec<String>,
    #[serde(skip)]
    pub(super) layout: EvalLayout,
}

fn descriptor_name<S: Serializer>(
    d: &Arc<ModelDescriptor>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&d.name)
}

fn optional_descriptor_name<S: Serializer>(
    d: &Option<Arc<ModelDescriptor>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.name),
        None => s.serialize_none(),
    }
}

impl CompositeModel {
    pub fn form_factor(&self) -> &ModelDescriptor {
        &self.form_factor
    }

    pub fn structure_factor(&self) -> Option<&ModelDescriptor> {
        self.structure_factor.as_deref()
    }

    pub fn radius_effective_mode(&self) -> RadiusEffectiveMode {
        self.radius_effective_mode
    }

    /// Merged parameters, including fitted distribution widths.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn polydispersity(&self) -> &PolydispersityConfig {
        &self.polydispersity
    }

    pub fn linked_parameters(&self) -> &[String] {
        &self.linked
    }

    /// Display name such as `cylinder@hardsphere`.
    pub fn name(&self) -> String {
        match &self.structure_factor {
            Some(sf) => format!("{}@{}", self.form_factor.name, sf.name),
            None => self.form_factor.name.clone(),
        }
    }

    /// Current parameter values in evaluation order.
    pub fn values(&self) -> Vec<f64> {
        self.parameters.values()
    }

    /// Evaluate I(q) for every q.
    ///
    /// I(q) = scale · ⟨F²⟩ / ⟨V⟩ · S(q) + background, with the averages taken over the
    /// distribution points of every polydisperse parameter.
    ///
    /// # Arguments
    ///
    /// * `q` - Scattering vector magnitudes in 1/Å
    /// * `values` - Parameter values in the order of [`parameters`](Self::parameters)
    ///
    /// # Returns
    ///
    /// * Intensities in 1/cm, or an error if any value is not finite
    pub fn evaluate(&self, q: &[f64], values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.parameters.len() {
            return Err(SasFitError::DimensionMismatch(format!(
                "Expected {} parameter values, got {}",
                self.parameters.len(),
                values.len()
            )));
        }

        let layout = &self.layout;
        let base: Vec<f64> = layout.form_args.iter().map(|&i| values[i]).collect();
        let grid = self.distribution_grid(&base, values);

        let volume: f64 = grid
            .iter()
            .map(|(w, args)| w * layout.form.form_volume(args))
            .sum();
        if !(volume.is_finite() && volume > 0.0) {
            return Err(SasFitError::FunctionEvaluation(format!(
                "{}: weighted particle volume is {volume}",
                self.name()
            )));
        }

        let structure_args: Vec<f64> = layout
            .structure_args
            .iter()
            .map(|source| match *source {
                ArgSource::Parameter(i) => values[i],
                ArgSource::FormArg(i) => base[i],
            })
            .collect();

        let scale = values[layout.scale];
        let background = values[layout.background];

        q.par_iter()
            .map(|&qi| {
                let mut form = 0.0;
                for (w, args) in &grid {
                    form += w * layout.form.form_squared(qi, args)?;
                }
                let structure = match &layout.structure {
                    Some(kernel) => kernel.structure(qi, &structure_args)?,
                    None => 1.0,
                };
                let intensity = scale * INTENSITY_UNITS * form / volume * structure + background;
                if intensity.is_finite() {
                    Ok(intensity)
                } else {
                    Err(SasFitError::FunctionEvaluation(format!(
                        "{}: non-finite intensity at q = {qi}",
                        self.name()
                    )))
                }
            })
            .collect()
    }

    /// Cartesian product of the distribution points of all dispersed arguments.
    fn distribution_grid(&self, base: &[f64], values: &[f64]) -> Vec<(f64, Vec<f64>)> {
        let mut grid = vec![(1.0, base.to_vec())];
        for dispersed in &self.layout.dispersed {
            let arg = dispersed.arg;
            let width = match dispersed.width {
                WidthSource::Fixed(w) => w,
                WidthSource::Parameter(i) => values[i],
            };
            let points = dispersed.settings.points(base[arg], width, dispersed.limits);
            grid = grid
                .into_iter()
                .flat_map(|(weight, args)| {
                    points.iter().map(move |&(x, px)| {
                        let mut args = args.clone();
                        args[arg] = x;
                        (weight * px, args)
                    })
                })
                .collect();
        }
        grid
    }
}
