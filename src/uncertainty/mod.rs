//! # Uncertainty Calculation
//!
//! Parameter standard errors from the Jacobian at the best fit. The covariance
//! is estimated as `scale * inv(JᵀJ)`, where `scale` is 1 for unscaled errors
//! or the reduced chi-square when errors are rescaled to the fit quality.

mod covariance;

pub use covariance::{calculate_covariance, standard_errors, standard_errors_from_covariance};
