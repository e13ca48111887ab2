//! Parameter bounds implementation
//!
//! Bounds on a fitted parameter and the Minuit-style transformation that lets the
//! least-squares optimizers work on unbounded internal coordinates while the model
//! always sees values inside `[min, max]`.

use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// Represents the bounds constraints on a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }
}

impl Bounds {
    /// Create a new bounds constraint with min and max values
    ///
    /// # Arguments
    ///
    /// * `min` - Minimum allowed value for the parameter
    /// * `max` - Maximum allowed value for the parameter
    ///
    /// # Returns
    ///
    /// A new `Bounds` object if min <= max, or an error otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// use sasfit_rs::parameters::Bounds;
    ///
    /// let bounds = Bounds::new(1.0, 200.0).unwrap();
    /// assert!(bounds.is_within_bounds(20.0));
    /// assert!(!bounds.is_within_bounds(300.0));
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Create an unbounded constraint (negative infinity to positive infinity)
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Check if a value is within the bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check if the bounds are finite (both min and max are finite)
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Clamp a value to be within the bounds
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Implements the Minuit-style parameter transformations for handling bounds constraints
///
/// The optimizer works with unbounded internal values; the external values handed
/// to the model are constrained to the bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Transform an internal parameter value to an external value
    ///
    /// # Arguments
    ///
    /// * `internal_value` - The internal parameter value
    ///
    /// # Returns
    ///
    /// The corresponding external value, constrained to be within bounds
    pub fn to_external(&self, internal_value: f64) -> f64 {
        let bounds = &self.bounds;
        match (bounds.has_lower_bound(), bounds.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => bounds.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => bounds.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => {
                let range = bounds.max - bounds.min;
                bounds.min + (internal_value.sin() + 1.0) * range / 2.0
            }
        }
    }

    /// Transform an external parameter value to an internal value
    ///
    /// # Arguments
    ///
    /// * `external_value` - The external parameter value
    ///
    /// # Returns
    ///
    /// The corresponding internal value, or an error if the external value is outside bounds
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        let bounds = &self.bounds;
        if !bounds.is_within_bounds(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: bounds.min,
                max: bounds.max,
            });
        }

        let internal = match (bounds.has_lower_bound(), bounds.has_upper_bound()) {
            (false, false) => external_value,
            (true, false) => ((external_value - bounds.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((bounds.max - external_value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let range = bounds.max - bounds.min;
                if range == 0.0 {
                    0.0
                } else {
                    // Ensure the argument stays in [-1, 1] for asin
                    let scaled =
                        (2.0 * (external_value - bounds.min) / range - 1.0).clamp(-1.0, 1.0);
                    scaled.asin()
                }
            }
        };
        Ok(internal)
    }

    /// Derivative of the external value with respect to the internal value.
    ///
    /// Used to map Jacobian columns between the two coordinate systems.
    pub fn external_derivative(&self, internal_value: f64) -> f64 {
        let bounds = &self.bounds;
        match (bounds.has_lower_bound(), bounds.has_upper_bound()) {
            (false, false) => 1.0,
            (true, false) => internal_value / (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => -internal_value / (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => (bounds.max - bounds.min) * internal_value.cos() / 2.0,
        }
    }
}
