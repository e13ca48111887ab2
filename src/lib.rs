//! # sasfit-rs
//!
//! `sasfit-rs` composes and runs small-angle scattering fits from declarative
//! requests.
//!
//! The library provides:
//! - A catalog of form factors and structure factors with default parameter specs
//! - Merging of partial parameter overrides into validated parameter sets
//! - Composition of form factor, structure factor and size distributions into one model
//! - Fit execution in isolated run workspaces with cancellation and time limits
//! - Normalization of engine output into a stable result schema
//!
//! ## Basic Usage
//!
//! ```
//! use sasfit_rs::catalog::ModelCatalog;
//! use sasfit_rs::composition::{compose, CompositionSpec, RadiusEffectiveMode};
//!
//! let catalog = ModelCatalog::builtin();
//! let mut spec = CompositionSpec::new("cylinder");
//! spec.structure_factor = Some("hardsphere".to_string());
//! spec.radius_effective_mode = RadiusEffectiveMode::LinkRadius;
//!
//! let model = compose(&catalog, &spec).unwrap();
//! assert_eq!(model.name(), "cylinder@hardsphere");
//! assert!(model.parameters().get("radius_effective").is_none());
//! ```

// Public modules
pub mod error;

// Parameter system
pub mod parameters;

// Models and their composition
pub mod catalog;
pub mod composition;
pub mod kernels;
pub mod polydispersity;

// Input data
pub mod data;

// Minimizers
pub mod control;
pub mod convergence;
pub mod global_opt;
pub mod lm;
pub mod problem;
pub mod simplex;
pub mod uncertainty;
mod utils;

// Execution
pub mod dispatch;
pub mod engine;
pub mod normalize;
pub mod plot;

// Workflows and the request surface
pub mod analysis;
pub mod config;
pub mod context;
pub mod service;

// Re-exports for convenience
pub use error::{ErrorKind, Result, SasFitError};

pub use composition::{compose, CompositeModel, CompositionSpec};

pub use context::Context;

pub use normalize::{FitResult, FitStatus};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
