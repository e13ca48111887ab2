//! Parameter specifications and ordered parameter sets.
//!
//! A [`ParameterSpec`] is a fully populated parameter description: value, bounds,
//! vary flag and display metadata. Catalog defaults, resolved request parameters
//! and composite-model parameters all use this one type.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

use super::bounds::Bounds;

/// Errors raised when a parameter violates its own invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter '{name}' value {value} is outside bounds [{min}, {max}]")]
    OutOfBounds {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid bounds for parameter '{name}': {reason}")]
    InvalidBounds { name: String, reason: String },

    #[error("Parameter '{name}' has non-finite value {value}")]
    NonFinite { name: String, value: f64 },
}

/// A single named parameter with bounds and a vary flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub value: f64,

    /// Lower bound; serialized as `null` when unbounded
    #[serde(
        default = "neg_infinity",
        serialize_with = "serialize_bound",
        deserialize_with = "deserialize_lower"
    )]
    pub min: f64,

    /// Upper bound; serialized as `null` when unbounded
    #[serde(
        default = "infinity",
        serialize_with = "serialize_bound",
        deserialize_with = "deserialize_upper"
    )]
    pub max: f64,

    #[serde(default)]
    pub vary: bool,

    #[serde(default)]
    pub unit: String,

    #[serde(default)]
    pub description: String,
}

fn neg_infinity() -> f64 {
    NEG_INFINITY
}

fn infinity() -> f64 {
    INFINITY
}

fn serialize_bound<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}

fn deserialize_lower<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(NEG_INFINITY))
}

fn deserialize_upper<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(INFINITY))
}

impl ParameterSpec {
    /// Create an unbounded, fixed parameter.
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            min: NEG_INFINITY,
            max: INFINITY,
            vary: false,
            unit: String::new(),
            description: String::new(),
        }
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_vary(mut self, vary: bool) -> Self {
        self.vary = vary;
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: self.min,
            max: self.max,
        }
    }

    /// Check the bound invariants.
    ///
    /// The value must be finite and lie in `[min, max]`; bounds must be ordered, and a
    /// varied parameter needs a non-degenerate interval. Values are never clamped.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.value.is_finite() {
            return Err(ParameterError::NonFinite {
                name: self.name.clone(),
                value: self.value,
            });
        }
        if Bounds::new(self.min, self.max).is_err() {
            return Err(ParameterError::InvalidBounds {
                name: self.name.clone(),
                reason: format!("min ({}) must not exceed max ({})", self.min, self.max),
            });
        }
        if self.vary && self.min == self.max {
            return Err(ParameterError::InvalidBounds {
                name: self.name.clone(),
                reason: format!(
                    "a varied parameter needs min < max, got {} == {}",
                    self.min, self.max
                ),
            });
        }
        if !self.bounds().is_within_bounds(self.value) {
            return Err(ParameterError::OutOfBounds {
                name: self.name.clone(),
                value: self.value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// An ordered collection of parameter specs with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    specs: Vec<ParameterSpec>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from specs, keeping the first occurrence of each name.
    pub fn from_specs(specs: Vec<ParameterSpec>) -> Self {
        let mut set = Self::new();
        for spec in specs {
            if !set.contains(&spec.name) {
                set.specs.push(spec);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.specs.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ParameterSpec> {
        self.specs.iter_mut().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    /// Append a spec, replacing an existing spec of the same name in place.
    pub fn insert(&mut self, spec: ParameterSpec) {
        match self.get_mut(&spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ParameterSpec> {
        let idx = self.position(name)?;
        Some(self.specs.remove(idx))
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.specs.iter().map(|s| s.value).collect()
    }

    /// Parameters with `vary == true`, in set order.
    pub fn varying(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.specs.iter().filter(|s| s.vary)
    }

    pub fn varying_count(&self) -> usize {
        self.varying().count()
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        self.specs.iter().try_for_each(ParameterSpec::validate)
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a ParameterSpec;
    type IntoIter = std::slice::Iter<'a, ParameterSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_out_of_bounds() {
        let spec = ParameterSpec::new("radius", 300.0).with_bounds(1.0, 200.0);
        assert!(matches!(
            spec.validate(),
            Err(ParameterError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_validate_vary_needs_interval() {
        let spec = ParameterSpec::new("radius", 5.0)
            .with_bounds(5.0, 5.0)
            .with_vary(true);
        assert!(matches!(
            spec.validate(),
            Err(ParameterError::InvalidBounds { .. })
        ));

        let fixed = ParameterSpec::new("radius", 5.0).with_bounds(5.0, 5.0);
        assert!(fixed.validate().is_ok());
    }

    #[test]
    fn test_infinite_bounds_serialize_as_null() {
        let spec = ParameterSpec::new("background", 0.001);
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json["min"].is_null());
        assert!(json["max"].is_null());

        let back: ParameterSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back.min, NEG_INFINITY);
        assert_eq!(back.max, INFINITY);
    }

    #[test]
    fn test_set_insert_replaces_in_place() {
        let mut set = ParameterSet::from_specs(vec![
            ParameterSpec::new("scale", 1.0),
            ParameterSpec::new("background", 0.001),
        ]);
        set.insert(ParameterSpec::new("scale", 2.0));
        assert_eq!(set.names(), vec!["scale", "background"]);
        assert_eq!(set.get("scale").unwrap().value, 2.0);

        set.insert(ParameterSpec::new("radius", 20.0));
        assert_eq!(set.len(), 3);
        assert!(set.remove("radius").is_some());
        assert!(!set.contains("radius"));
    }
}
