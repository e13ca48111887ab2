//! Scattering kernels.
//!
//! Kernels are opaque numeric services behind two traits. The composition layer
//! only hands them argument slices laid out in catalog order and never needs to
//! know which shape or interaction it is evaluating.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

pub mod form_factors;
pub mod special;
pub mod structure_factors;

/// A particle shape: orientation-averaged squared amplitude and volume.
pub trait FormFactor: Send + Sync + fmt::Debug {
    /// Particle volume in Å³ for the given shape arguments.
    fn form_volume(&self, args: &[f64]) -> f64;

    /// Orientation-averaged (Δρ V f(q))² at a single q.
    fn form_squared(&self, q: f64, args: &[f64]) -> Result<f64>;
}

/// An interparticle interference term S(q).
pub trait StructureFactor: Send + Sync + fmt::Debug {
    fn structure(&self, q: f64, args: &[f64]) -> Result<f64>;
}

/// The evaluation function attached to a catalog entry.
#[derive(Debug, Clone)]
pub enum Kernel {
    Form(Arc<dyn FormFactor>),
    Structure(Arc<dyn StructureFactor>),
}

impl Kernel {
    pub fn form<F: FormFactor + 'static>(kernel: F) -> Self {
        Kernel::Form(Arc::new(kernel))
    }

    pub fn structure<S: StructureFactor + 'static>(kernel: S) -> Self {
        Kernel::Structure(Arc::new(kernel))
    }
}
