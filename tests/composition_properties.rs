//! Catalog-wide properties of parameter resolution and composition.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use sasfit_rs::catalog::{ModelCatalog, ModelCategory};
use sasfit_rs::composition::{compose, CompositionSpec, RadiusEffectiveMode};
use sasfit_rs::config::Config;
use sasfit_rs::parameters::{resolve, Overrides, ParameterOverride};
use sasfit_rs::polydispersity::PdSettings;
use sasfit_rs::{service, Context, SasFitError};

#[test]
fn test_empty_overrides_are_identity() {
    let catalog = ModelCatalog::builtin();
    for descriptor in catalog.iter() {
        let resolved =
            resolve(&descriptor.name, &descriptor.parameters, &Overrides::new()).unwrap();
        assert_eq!(resolved, descriptor.parameters, "{}", descriptor.name);
    }
}

#[test]
fn test_unknown_override_keys() {
    let catalog = ModelCatalog::builtin();
    for descriptor in catalog.iter() {
        let mut overrides = Overrides::new();
        overrides.insert("not_a_parameter".to_string(), ParameterOverride::value(1.0));
        let err = resolve(&descriptor.name, &descriptor.parameters, &overrides).unwrap_err();
        assert!(matches!(err, SasFitError::UnknownParameter { .. }), "{}", descriptor.name);
    }
}

#[test]
fn test_values_are_never_clamped() {
    let catalog = ModelCatalog::builtin();
    for descriptor in catalog.iter() {
        for spec in descriptor.parameters.iter() {
            if !spec.max.is_finite() {
                continue;
            }
            let mut overrides = Overrides::new();
            overrides.insert(spec.name.clone(), ParameterOverride::value(spec.max + 1.0));
            match resolve(&descriptor.name, &descriptor.parameters, &overrides) {
                Err(SasFitError::OutOfBounds { name, value, .. }) => {
                    assert_eq!(name, spec.name);
                    assert_eq!(value, spec.max + 1.0);
                }
                other => panic!(
                    "{}.{}: expected OutOfBounds, got {other:?}",
                    descriptor.name, spec.name
                ),
            }
        }
    }
}

#[test]
fn test_link_radius_across_products() {
    let catalog = ModelCatalog::builtin();
    for form in catalog.names(ModelCategory::FormFactor) {
        for structure in catalog.names(ModelCategory::StructureFactor) {
            let mut spec = CompositionSpec::new(form);
            spec.structure_factor = Some(structure.to_string());

            let unconstrained = match compose(&catalog, &spec) {
                Ok(model) => model,
                Err(SasFitError::IncompatibleModels(_)) => continue,
                Err(e) => panic!("{form}@{structure}: {e}"),
            };
            assert!(unconstrained.parameters().contains("radius_effective"));

            spec.radius_effective_mode = RadiusEffectiveMode::LinkRadius;
            spec.structure_factor_params.insert(
                "radius_effective".to_string(),
                ParameterOverride {
                    vary: Some(true),
                    ..Default::default()
                },
            );
            let linked = compose(&catalog, &spec).unwrap();
            assert!(!linked.parameters().contains("radius_effective"));
            assert_eq!(linked.parameters().len() + 1, unconstrained.parameters().len());
            assert_eq!(linked.linked_parameters(), ["radius_effective".to_string()]);
        }
    }
}

#[test]
fn test_polydispersity_only_on_capable_parameters() {
    let catalog = ModelCatalog::builtin();
    for descriptor in catalog.iter().filter(|d| d.category == ModelCategory::FormFactor) {
        for spec in descriptor.parameters.iter() {
            let mut composition = CompositionSpec::new(&descriptor.name);
            composition.polydispersity.insert(
                spec.name.clone(),
                PdSettings {
                    pd_width: 0.1,
                    ..PdSettings::default()
                },
            );
            let outcome = compose(&catalog, &composition);
            if descriptor.is_polydisperse(&spec.name) {
                assert!(outcome.is_ok(), "{}.{}", descriptor.name, spec.name);
            } else {
                assert!(
                    matches!(outcome, Err(SasFitError::UnsupportedPolydispersity { .. })),
                    "{}.{}",
                    descriptor.name,
                    spec.name
                );
            }
        }
    }
}

#[tokio::test]
async fn test_sphere_polydisperse_parameters() {
    let root = tempfile::TempDir::new().unwrap();
    let context = Context::new(Config {
        runs_dir: root.path().join("runs"),
        upload_dir: root.path().join("uploads"),
        ..Config::default()
    });

    let names = service::call(
        &context,
        "get-polydisperse-parameters",
        json!({"model_name": "sphere"}),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let names: Vec<String> = serde_json::from_value(names).unwrap();
    assert_eq!(names, vec!["radius".to_string()]);
    assert!(!names.iter().any(|n| n == "scale" || n == "background"));
}
