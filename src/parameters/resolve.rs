//! Merging catalog defaults with caller overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::parameter::{ParameterSet, ParameterSpec};
use crate::error::{Result, SasFitError};

/// A partial parameter specification supplied by a caller.
///
/// Every field is optional; omitted fields inherit the default. `description` is
/// accepted for compatibility with clients that echo catalog output back, and is
/// discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing)]
    pub description: Option<String>,
}

impl ParameterOverride {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn fitted(value: f64, min: f64, max: f64) -> Self {
        Self {
            value: Some(value),
            min: Some(min),
            max: Some(max),
            vary: Some(true),
            ..Self::default()
        }
    }

    /// Fill the fields this override leaves unset from `base`.
    pub fn or(&self, base: &ParameterOverride) -> ParameterOverride {
        ParameterOverride {
            value: self.value.or(base.value),
            min: self.min.or(base.min),
            max: self.max.or(base.max),
            vary: self.vary.or(base.vary),
            unit: self.unit.clone().or_else(|| base.unit.clone()),
            description: None,
        }
    }

    fn apply_to(&self, spec: &mut ParameterSpec) {
        if let Some(value) = self.value {
            spec.value = value;
        }
        if let Some(min) = self.min {
            spec.min = min;
        }
        if let Some(max) = self.max {
            spec.max = max;
        }
        if let Some(vary) = self.vary {
            spec.vary = vary;
        }
        if let Some(unit) = &self.unit {
            spec.unit = unit.clone();
        }
    }
}

/// Overrides keyed by parameter name.
pub type Overrides = BTreeMap<String, ParameterOverride>;

/// Merge `defaults` with `overrides` into a validated parameter set.
///
/// Unknown override keys are reported before any merging happens. The result keeps
/// the order of `defaults`; with no overrides it equals `defaults` exactly.
///
/// # Arguments
///
/// * `model` - Model name, used in error messages
/// * `defaults` - The model's default parameter specs
/// * `overrides` - Partial overrides keyed by parameter name
///
/// # Returns
///
/// The merged parameter set, or `UnknownParameter`, `OutOfBounds` or `InvalidBounds`
pub fn resolve(
    model: &str,
    defaults: &ParameterSet,
    overrides: &Overrides,
) -> Result<ParameterSet> {
    if let Some(unknown) = overrides.keys().find(|name| !defaults.contains(name)) {
        return Err(SasFitError::UnknownParameter {
            model: model.to_string(),
            name: unknown.clone(),
        });
    }

    let mut resolved = defaults.clone();
    for (name, entry) in overrides {
        if entry.description.is_some() {
            debug!(model, parameter = %name, "discarding override description");
        }
        if let Some(spec) = resolved.get_mut(name) {
            entry.apply_to(spec);
        }
    }

    resolved.validate()?;
    debug!(
        model,
        overridden = overrides.len(),
        varying = resolved.varying_count(),
        "resolved parameters"
    );
    Ok(resolved)
}
