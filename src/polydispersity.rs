//! Size distributions for polydisperse parameters.
//!
//! A distribution replaces a single parameter value by a weighted set of points
//! around it. The width is relative to the parameter value, so a width of 0.1 on a
//! radius of 20 Å spreads the radius by σ = 2 Å.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SasFitError};
use crate::parameters::Bounds;

/// Shape of the distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdType {
    #[default]
    Gaussian,
    Lognormal,
    Schulz,
    Rectangle,
    Boltzmann,
}

impl PdType {
    pub const ALL: [PdType; 5] = [
        PdType::Gaussian,
        PdType::Lognormal,
        PdType::Schulz,
        PdType::Rectangle,
        PdType::Boltzmann,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PdType::Gaussian => "gaussian",
            PdType::Lognormal => "lognormal",
            PdType::Schulz => "schulz",
            PdType::Rectangle => "rectangle",
            PdType::Boltzmann => "boltzmann",
        }
    }

    /// Distributions that only make sense for strictly positive values.
    fn positive_support(&self) -> bool {
        matches!(self, PdType::Lognormal | PdType::Schulz)
    }
}

pub const DEFAULT_PD_N: usize = 35;
pub const DEFAULT_PD_NSIGMA: f64 = 3.0;

fn default_pd_n() -> usize {
    DEFAULT_PD_N
}

fn default_pd_nsigma() -> f64 {
    DEFAULT_PD_NSIGMA
}

/// Distribution settings for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdSettings {
    #[serde(default)]
    pub pd_type: PdType,
    /// Relative width; zero disables broadening
    #[serde(default)]
    pub pd_width: f64,
    #[serde(default = "default_pd_n")]
    pub pd_n: usize,
    #[serde(default = "default_pd_nsigma")]
    pub pd_nsigma: f64,
    /// Fit the width as `<parameter>_pd`
    #[serde(default)]
    pub vary: bool,
}

impl Default for PdSettings {
    fn default() -> Self {
        Self {
            pd_type: PdType::default(),
            pd_width: 0.0,
            pd_n: DEFAULT_PD_N,
            pd_nsigma: DEFAULT_PD_NSIGMA,
            vary: false,
        }
    }
}

/// Distribution settings keyed by parameter name.
pub type PolydispersityConfig = BTreeMap<String, PdSettings>;

/// Name of the fitted width parameter for `parameter`.
pub fn width_parameter(parameter: &str) -> String {
    format!("{parameter}_pd")
}

impl PdSettings {
    /// Check the settings for `parameter`.
    pub fn validate(&self, parameter: &str) -> Result<()> {
        let invalid = |reason: String| SasFitError::InvalidPolydispersity {
            parameter: parameter.to_string(),
            reason,
        };

        if !self.pd_width.is_finite() || self.pd_width < 0.0 {
            return Err(invalid(format!("pd_width must be >= 0, got {}", self.pd_width)));
        }
        if self.pd_n < 1 {
            return Err(invalid("pd_n must be at least 1".to_string()));
        }
        if !self.pd_nsigma.is_finite() || self.pd_nsigma <= 0.0 {
            return Err(invalid(format!("pd_nsigma must be > 0, got {}", self.pd_nsigma)));
        }
        if self.vary && self.pd_width > 1.0 {
            return Err(invalid(format!(
                "a fitted pd_width must lie in [0, 1], got {}",
                self.pd_width
            )));
        }
        if self.pd_type == PdType::Schulz && self.pd_width >= 1.0 && !self.vary {
            return Err(invalid("schulz distribution needs pd_width < 1".to_string()));
        }
        Ok(())
    }

    /// Weighted points of the distribution around `center`.
    ///
    /// Points outside `limits` (and non-positive points for lognormal and schulz)
    /// are dropped. Weights are not normalized; the composite model divides by the
    /// weighted volume. A zero width or a single point yields `[(center, 1.0)]`.
    pub fn points(&self, center: f64, width: f64, limits: Bounds) -> Vec<(f64, f64)> {
        let sigma = width * center.abs();
        if width <= 0.0 || sigma == 0.0 || self.pd_n <= 1 {
            return vec![(center, 1.0)];
        }

        let half_range = match self.pd_type {
            PdType::Rectangle => 3.0_f64.sqrt() * sigma,
            _ => self.pd_nsigma * sigma,
        };
        let lo = center - half_range;
        let hi = center + half_range;
        let n = self.pd_n;
        let step = (hi - lo) / (n - 1) as f64;

        let points: Vec<(f64, f64)> = (0..n)
            .map(|i| lo + step * i as f64)
            .filter(|x| limits.is_within_bounds(*x))
            .filter(|x| !self.pd_type.positive_support() || *x > 0.0)
            .map(|x| (x, self.weight(x, center, sigma, width)))
            .filter(|(_, w)| w.is_finite() && *w > 0.0)
            .collect();

        if points.is_empty() {
            vec![(center, 1.0)]
        } else {
            points
        }
    }

    fn weight(&self, x: f64, center: f64, sigma: f64, width: f64) -> f64 {
        match self.pd_type {
            PdType::Gaussian => (-0.5 * ((x - center) / sigma).powi(2)).exp(),
            PdType::Rectangle => 1.0,
            PdType::Boltzmann => (-(x - center).abs() / sigma).exp(),
            PdType::Lognormal => {
                (-0.5 * ((x.ln() - center.ln()) / width).powi(2)).exp() / x
            }
            PdType::Schulz => {
                let z = 1.0 / (width * width) - 1.0;
                let r = x / center;
                (z * r.ln() - (z + 1.0) * r).exp()
            }
        }
    }
}
