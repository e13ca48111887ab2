//! Levenberg-Marquardt algorithm implementation.
//!
//! Damped Gauss-Newton steps for nonlinear least squares; used as the
//! gradient-based method of both fitting engines.

pub mod algorithm;
pub mod config;

// Re-export key types
pub use algorithm::LevenbergMarquardt;
pub use config::{DecompositionMethod, LmConfig};
