//! Interparticle structure factors.
//!
//! Arguments follow the catalog order: radius_effective, volfraction, then any
//! model-specific parameters.

use super::StructureFactor;
use crate::error::{Result, SasFitError};

/// Percus-Yevick closure for hard spheres.
/// Arguments: radius_effective, volfraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardSphere;

impl StructureFactor for HardSphere {
    fn structure(&self, q: f64, args: &[f64]) -> Result<f64> {
        let (radius, phi) = (args[0], args[1]);
        if phi <= 0.0 || radius <= 0.0 {
            return Ok(1.0);
        }

        let denom = (1.0 - phi).powi(4);
        let alpha = (1.0 + 2.0 * phi).powi(2) / denom;
        let beta = -6.0 * phi * (1.0 + 0.5 * phi).powi(2) / denom;
        let gamma = 0.5 * phi * alpha;

        let a = 2.0 * q * radius;
        // G(A) / A; the closed form cancels catastrophically for small A
        let g_over_a = if a < 0.05 {
            (alpha / 3.0 + beta / 4.0 + gamma / 6.0)
                - a * a * (alpha / 30.0 + beta / 36.0 + gamma / 48.0)
        } else {
            let (s, c) = a.sin_cos();
            let a2 = a * a;
            let a3 = a2 * a;
            let a4 = a2 * a2;
            let a5 = a4 * a;
            let g = alpha * (s - a * c) / a2
                + beta * (2.0 * a * s + (2.0 - a2) * c - 2.0) / a3
                + gamma * (-a4 * c + 4.0 * ((3.0 * a2 - 6.0) * c + (a3 - 6.0 * a) * s + 6.0)) / a5;
            g / a
        };

        Ok(1.0 / (1.0 + 24.0 * phi * g_over_a))
    }
}

/// Baxter sticky hard spheres in the Menon perturbative solution.
/// Arguments: radius_effective, volfraction, perturb, stickiness.
#[derive(Debug, Clone, Copy, Default)]
pub struct StickyHardSphere;

impl StructureFactor for StickyHardSphere {
    fn structure(&self, q: f64, args: &[f64]) -> Result<f64> {
        let (radius, phi, perturb, stickiness) = (args[0], args[1], args[2], args[3]);

        let one_minus_eps = 1.0 - perturb;
        let eta = phi / one_minus_eps.powi(3);
        let sigma = 2.0 * radius;
        let aa = sigma / one_minus_eps;
        let etam1 = 1.0 - eta;
        let etam1sq = etam1 * etam1;

        let qa = eta / 6.0;
        let qb = stickiness + eta / etam1;
        let qc = (1.0 + 0.5 * eta) / etam1sq;
        let radicand = qb * qb - 2.0 * qa * qc;
        if radicand < 0.0 || qa == 0.0 {
            return Err(SasFitError::FunctionEvaluation(format!(
                "sticky hard sphere has no physical solution for volfraction {phi}, \
                 stickiness {stickiness}"
            )));
        }

        // Keep the smaller root; the larger one is unphysical
        let root = radicand.sqrt();
        let lambda = ((qb - root) / qa).min((qb + root) / qa);
        let mu = lambda * eta * etam1;
        if mu > 1.0 + 2.0 * eta {
            return Err(SasFitError::FunctionEvaluation(format!(
                "sticky hard sphere stickiness {stickiness} exceeds the percolation limit"
            )));
        }

        let alpha = (1.0 + 2.0 * eta - mu) / etam1sq;
        let beta = (mu - 3.0 * eta) / (2.0 * etam1sq);

        // S(q) is flat below this point and the closed form loses precision
        let kk = (q * aa).max(1e-3);
        let k2 = kk * kk;
        let k3 = k2 * kk;
        let (ss, cc) = kk.sin_cos();

        let bracket =
            alpha * (ss - kk * cc) / k3 + beta * (1.0 - cc) / k2 - lambda * ss / (12.0 * kk);
        let aq = 1.0 + 12.0 * eta * bracket;
        let bq = 12.0
            * eta
            * (alpha * (0.5 / kk - ss / k2 + (1.0 - cc) / k3) + beta * (1.0 / kk - ss / k2)
                - lambda / 12.0 * (1.0 - cc) / kk);

        Ok(1.0 / (aq * aq + bq * bq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hardsphere_compressibility_limit() {
        let phi: f64 = 0.2;
        let expected = (1.0 - phi).powi(4) / (1.0 + 2.0 * phi).powi(2);
        let s0 = HardSphere.structure(1e-6, &[50.0, phi]).unwrap();
        assert_relative_eq!(s0, expected, max_relative = 1e-6);
    }

    #[test]
    fn test_hardsphere_series_joins_closed_form() {
        // A = 2 q R crosses 0.05 at q = 5e-4 for R = 50
        let below = HardSphere.structure(0.0004999, &[50.0, 0.3]).unwrap();
        let above = HardSphere.structure(0.0005001, &[50.0, 0.3]).unwrap();
        assert_relative_eq!(below, above, max_relative = 1e-6);
    }

    #[test]
    fn test_hardsphere_approaches_one_at_high_q() {
        let s = HardSphere.structure(2.0, &[50.0, 0.2]).unwrap();
        assert_relative_eq!(s, 1.0, epsilon = 0.01);
        assert_eq!(HardSphere.structure(0.1, &[50.0, 0.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_sticky_hardsphere_is_finite_and_positive() {
        for q in [1e-4, 0.01, 0.05, 0.2] {
            let s = StickyHardSphere
                .structure(q, &[50.0, 0.1, 0.05, 0.2])
                .unwrap();
            assert!(s.is_finite() && s > 0.0);
        }
    }

    #[test]
    fn test_sticky_hardsphere_rejects_unphysical_stickiness() {
        let result = StickyHardSphere.structure(0.01, &[50.0, 0.3, 0.05, -1.0]);
        assert!(matches!(result, Err(SasFitError::FunctionEvaluation(_))));
    }
}
