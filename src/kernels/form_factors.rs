//! Particle form factors.
//!
//! Each kernel returns the orientation-averaged squared scattering amplitude
//! (Δρ V f(q))² in units of (1e-6 Å⁻² Å³)², and the particle volume in Å³.
//! Arguments follow the order of the model's shape parameters in the catalog.

use std::f64::consts::{FRAC_PI_2, PI};

use super::special::{j1c, sinc, sph_j1c, GAUSS};
use super::FormFactor;
use crate::error::Result;

fn sphere_volume(radius: f64) -> f64 {
    4.0 / 3.0 * PI * radius.powi(3)
}

/// Homogeneous sphere. Arguments: sld, sld_solvent, radius.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sphere;

impl FormFactor for Sphere {
    fn form_volume(&self, args: &[f64]) -> f64 {
        sphere_volume(args[2])
    }

    fn form_squared(&self, q: f64, args: &[f64]) -> Result<f64> {
        let (sld, solvent, radius) = (args[0], args[1], args[2]);
        let amplitude = (sld - solvent) * sphere_volume(radius) * sph_j1c(q * radius);
        Ok(amplitude * amplitude)
    }
}

/// Sphere with a single concentric shell.
/// Arguments: radius, thickness, sld_core, sld_shell, sld_solvent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreShellSphere;

impl FormFactor for CoreShellSphere {
    fn form_volume(&self, args: &[f64]) -> f64 {
        sphere_volume(args[0] + args[1])
    }

    fn form_squared(&self, q: f64, args: &[f64]) -> Result<f64> {
        let (radius, thickness) = (args[0], args[1]);
        let (core, shell, solvent) = (args[2], args[3], args[4]);
        let outer = radius + thickness;
        let amplitude = (core - shell) * sphere_volume(radius) * sph_j1c(q * radius)
            + (shell - solvent) * sphere_volume(outer) * sph_j1c(q * outer);
        Ok(amplitude * amplitude)
    }
}

/// Right circular cylinder averaged over all orientations.
/// Arguments: sld, sld_solvent, radius, length.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cylinder;

impl FormFactor for Cylinder {
    fn form_volume(&self, args: &[f64]) -> f64 {
        PI * args[2] * args[2] * args[3]
    }

    fn form_squared(&self, q: f64, args: &[f64]) -> Result<f64> {
        let (sld, solvent, radius, length) = (args[0], args[1], args[2], args[3]);
        let scale = (sld - solvent) * self.form_volume(args);
        // ∫ sin(α) dα over [0, π/2] is one, so no normalization is needed
        let average = GAUSS.integrate(0.0, FRAC_PI_2, |alpha| {
            let (sin_a, cos_a) = alpha.sin_cos();
            let f = j1c(q * radius * sin_a) * sinc(0.5 * q * length * cos_a);
            f * f * sin_a
        });
        Ok(scale * scale * average)
    }
}

/// Ellipsoid of revolution averaged over all orientations.
/// Arguments: sld, sld_solvent, radius_polar, radius_equatorial.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ellipsoid;

impl FormFactor for Ellipsoid {
    fn form_volume(&self, args: &[f64]) -> f64 {
        4.0 / 3.0 * PI * args[2] * args[3] * args[3]
    }

    fn form_squared(&self, q: f64, args: &[f64]) -> Result<f64> {
        let (sld, solvent, polar, equatorial) = (args[0], args[1], args[2], args[3]);
        let scale = (sld - solvent) * self.form_volume(args);
        let average = GAUSS.integrate(0.0, 1.0, |u| {
            let r = (equatorial * equatorial * (1.0 - u * u) + polar * polar * u * u).sqrt();
            let f = sph_j1c(q * r);
            f * f
        });
        Ok(scale * scale * average)
    }
}

/// Power law I(q) = q^-power. Argument: power.
///
/// Has no particle volume; the unit volume and the 1e4 factor cancel the
/// normalization applied by the composite model.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerLaw;

impl FormFactor for PowerLaw {
    fn form_volume(&self, _args: &[f64]) -> f64 {
        1.0
    }

    fn form_squared(&self, q: f64, args: &[f64]) -> Result<f64> {
        Ok(1.0e4 * q.powf(-args[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_scattering_limits() {
        let q = 1e-6;

        let sphere = [1.0, 6.0, 50.0];
        let v = Sphere.form_volume(&sphere);
        assert_relative_eq!(
            Sphere.form_squared(q, &sphere).unwrap(),
            (5.0 * v).powi(2),
            max_relative = 1e-8
        );

        let cylinder = [4.0, 1.0, 20.0, 400.0];
        let v = Cylinder.form_volume(&cylinder);
        assert_relative_eq!(
            Cylinder.form_squared(q, &cylinder).unwrap(),
            (3.0 * v).powi(2),
            max_relative = 1e-6
        );

        let ellipsoid = [4.0, 1.0, 20.0, 400.0];
        let v = Ellipsoid.form_volume(&ellipsoid);
        assert_relative_eq!(
            Ellipsoid.form_squared(q, &ellipsoid).unwrap(),
            (3.0 * v).powi(2),
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_sphere_first_minimum() {
        // tan(x) = x has its first root at x ≈ 4.4934
        let args = [1.0, 6.0, 50.0];
        let q_min = 4.493409 / 50.0;
        let at_min = Sphere.form_squared(q_min, &args).unwrap();
        let forward = Sphere.form_squared(1e-6, &args).unwrap();
        assert!(at_min / forward < 1e-9);
    }

    #[test]
    fn test_core_shell_matches_sphere_without_contrast_step() {
        // shell sld equal to core sld reduces to a homogeneous sphere of radius 70
        let core_shell = [60.0, 10.0, 2.0, 2.0, 3.0];
        let sphere = [2.0, 3.0, 70.0];
        for q in [0.001, 0.01, 0.05, 0.2] {
            assert_relative_eq!(
                CoreShellSphere.form_squared(q, &core_shell).unwrap(),
                Sphere.form_squared(q, &sphere).unwrap(),
                max_relative = 1e-10
            );
        }
    }

    #[test]
    fn test_ellipsoid_with_equal_radii_is_sphere() {
        let ellipsoid = [4.0, 1.0, 30.0, 30.0];
        let sphere = [4.0, 1.0, 30.0];
        for q in [0.005, 0.05, 0.3] {
            assert_relative_eq!(
                Ellipsoid.form_squared(q, &ellipsoid).unwrap(),
                Sphere.form_squared(q, &sphere).unwrap(),
                max_relative = 1e-8
            );
        }
    }

    #[test]
    fn test_power_law() {
        let value = PowerLaw.form_squared(0.1, &[4.0]).unwrap();
        assert_relative_eq!(value, 1.0e4 * 1.0e4, max_relative = 1e-12);
    }
}
