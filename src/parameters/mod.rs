//! # Parameter System
//!
//! Named, bounded parameters for scattering models.
//!
//! ## Core Components
//!
//! - [`ParameterSpec`]: a parameter with value, bounds, vary flag and metadata
//! - [`ParameterSet`]: an ordered collection of specs with unique names
//! - [`ParameterOverride`] and [`resolve`]: merge caller overrides into catalog defaults
//! - [`Bounds`] and [`BoundsTransform`]: handle parameter bounds during optimization
//!
//! ## Example Usage
//!
//! ```rust
//! use sasfit_rs::parameters::{resolve, Overrides, ParameterOverride, ParameterSet, ParameterSpec};
//!
//! let defaults = ParameterSet::from_specs(vec![
//!     ParameterSpec::new("radius", 20.0).with_bounds(0.0, f64::INFINITY),
//! ]);
//!
//! let mut overrides = Overrides::new();
//! overrides.insert("radius".to_string(), ParameterOverride::fitted(25.0, 1.0, 200.0));
//!
//! let resolved = resolve("sphere", &defaults, &overrides).unwrap();
//! assert!(resolved.get("radius").unwrap().vary);
//! ```

pub mod bounds;
pub mod parameter;
pub mod resolve;

// Re-export key types
pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use parameter::{ParameterError, ParameterSet, ParameterSpec};
pub use resolve::{resolve, Overrides, ParameterOverride};
