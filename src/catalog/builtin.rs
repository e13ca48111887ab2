use std::f64::{INFINITY, NEG_INFINITY};

use super::{ModelCategory, ModelDescriptor};
use crate::kernels::form_factors::{CoreShellSphere, Cylinder, Ellipsoid, PowerLaw, Sphere};
use crate::kernels::structure_factors::{HardSphere, StickyHardSphere};
use crate::kernels::Kernel;
use crate::parameters::{ParameterSet, ParameterSpec};

const SLD_UNIT: &str = "1e-6/Ang^2";

fn shared() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("scale", 1.0)
            .with_bounds(0.0, INFINITY)
            .with_description("Source intensity"),
        ParameterSpec::new("background", 0.001)
            .with_bounds(NEG_INFINITY, INFINITY)
            .with_unit("1/cm")
            .with_description("Source background"),
    ]
}

fn sld(name: &str, value: f64, description: &str) -> ParameterSpec {
    ParameterSpec::new(name, value)
        .with_unit(SLD_UNIT)
        .with_description(description)
}

fn length(name: &str, value: f64, description: &str) -> ParameterSpec {
    ParameterSpec::new(name, value)
        .with_bounds(0.0, INFINITY)
        .with_unit("Ang")
        .with_description(description)
}

fn form_factor(
    name: &str,
    description: &str,
    parameters: Vec<ParameterSpec>,
    polydisperse: &[&str],
    size_parameter: Option<&str>,
    kernel: Kernel,
) -> ModelDescriptor {
    let mut specs = shared();
    specs.extend(parameters);
    ModelDescriptor {
        name: name.to_string(),
        category: ModelCategory::FormFactor,
        description: description.to_string(),
        parameters: ParameterSet::from_specs(specs),
        polydisperse: polydisperse.iter().map(|p| p.to_string()).collect(),
        size_parameter: size_parameter.map(str::to_string),
        kernel,
    }
}

fn structure_factor(
    name: &str,
    description: &str,
    parameters: Vec<ParameterSpec>,
    kernel: Kernel,
) -> ModelDescriptor {
    let mut specs = shared();
    specs.extend(parameters);
    ModelDescriptor {
        name: name.to_string(),
        category: ModelCategory::StructureFactor,
        description: description.to_string(),
        parameters: ParameterSet::from_specs(specs),
        polydisperse: Vec::new(),
        size_parameter: None,
        kernel,
    }
}

pub(super) fn descriptors() -> Vec<ModelDescriptor> {
    vec![
        form_factor(
            "sphere",
            "Spheres with uniform scattering length density",
            vec![
                sld("sld", 1.0, "Layer scattering length density"),
                sld("sld_solvent", 6.0, "Solvent scattering length density"),
                length("radius", 50.0, "Sphere radius"),
            ],
            &["radius"],
            Some("radius"),
            Kernel::form(Sphere),
        ),
        form_factor(
            "core_shell_sphere",
            "Spheres with a core and a single concentric shell",
            vec![
                length("radius", 60.0, "Sphere core radius"),
                length("thickness", 10.0, "Sphere shell thickness"),
                sld("sld_core", 1.0, "Core scattering length density"),
                sld("sld_shell", 2.0, "Shell scattering length density"),
                sld("sld_solvent", 3.0, "Solvent scattering length density"),
            ],
            &["radius", "thickness"],
            Some("radius"),
            Kernel::form(CoreShellSphere),
        ),
        form_factor(
            "cylinder",
            "Right circular cylinder with uniform scattering length density",
            vec![
                sld("sld", 4.0, "Cylinder scattering length density"),
                sld("sld_solvent", 1.0, "Solvent scattering length density"),
                length("radius", 20.0, "Cylinder radius"),
                length("length", 400.0, "Cylinder length"),
            ],
            &["radius", "length"],
            Some("radius"),
            Kernel::form(Cylinder),
        ),
        form_factor(
            "ellipsoid",
            "Ellipsoid of revolution with uniform scattering length density",
            vec![
                sld("sld", 4.0, "Ellipsoid scattering length density"),
                sld("sld_solvent", 1.0, "Solvent scattering length density"),
                length("radius_polar", 20.0, "Polar radius"),
                length("radius_equatorial", 400.0, "Equatorial radius"),
            ],
            &["radius_polar", "radius_equatorial"],
            Some("radius_equatorial"),
            Kernel::form(Ellipsoid),
        ),
        form_factor(
            "power_law",
            "Simple power law with a flat background",
            vec![ParameterSpec::new("power", 4.0)
                .with_bounds(NEG_INFINITY, INFINITY)
                .with_description("Power law exponent")],
            &[],
            None,
            Kernel::form(PowerLaw),
        ),
        structure_factor(
            "hardsphere",
            "Hard sphere structure factor, Percus-Yevick closure",
            vec![
                length("radius_effective", 50.0, "Effective radius of hard sphere"),
                ParameterSpec::new("volfraction", 0.2)
                    .with_bounds(0.0, 0.74)
                    .with_description("Volume fraction of hard spheres"),
            ],
            Kernel::structure(HardSphere),
        ),
        structure_factor(
            "stickyhardsphere",
            "Sticky hard sphere structure factor with Baxter's sticky potential",
            vec![
                length("radius_effective", 50.0, "Effective radius of hard sphere"),
                ParameterSpec::new("volfraction", 0.1)
                    .with_bounds(0.0, 0.74)
                    .with_description("Volume fraction of hard spheres"),
                ParameterSpec::new("perturb", 0.05)
                    .with_bounds(0.01, 0.1)
                    .with_description("Perturbation parameter, tau"),
                ParameterSpec::new("stickiness", 0.2)
                    .with_bounds(NEG_INFINITY, INFINITY)
                    .with_description("Stickiness, tau"),
            ],
            Kernel::structure(StickyHardSphere),
        ),
    ]
}
