use async_trait::async_trait;
use serde_json::json;

use super::{common_schema, Analysis, AnalysisRequest};
use crate::catalog::ModelCatalog;
use crate::composition::{compose, CompositeModel, CompositionSpec};
use crate::error::{Result, SasFitError};
use crate::parameters::{Overrides, ParameterOverride};

const MODEL: &str = "cylinder";

/// Starting point of the template; caller overrides are layered on top.
fn template_overrides() -> Overrides {
    let fixed = |value| ParameterOverride {
        vary: Some(false),
        ..ParameterOverride::value(value)
    };
    Overrides::from([
        ("radius".to_string(), ParameterOverride::fitted(20.0, 1.0, 100.0)),
        ("length".to_string(), ParameterOverride::fitted(400.0, 10.0, 1000.0)),
        ("sld".to_string(), fixed(4.0)),
        ("sld_solvent".to_string(), fixed(1.0)),
        ("scale".to_string(), ParameterOverride::fitted(1.0, 0.1, 10.0)),
        ("background".to_string(), ParameterOverride::fitted(0.001, 0.0, 1.0)),
    ])
}

/// Fit a cylinder with preset starting values and ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct CylinderTemplateFit;

#[async_trait]
impl Analysis for CylinderTemplateFit {
    fn name(&self) -> &'static str {
        "fitting-with-cylinder-model"
    }

    fn description(&self) -> &'static str {
        "Fit data with a cylinder. Defaults: radius 20 (1-100, fitted), \
         length 400 (10-1000, fitted), sld 4 (fixed), sld_solvent 1 (fixed), \
         scale 1 (0.1-10, fitted), background 0.001 (0-1, fitted). \
         Any field can be changed through param_overrides."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        let mut schema = common_schema();
        schema.insert(
            "param_overrides".to_string(),
            json!({
                "type": "object",
                "description": "Changes to the cylinder template",
                "defaults": template_overrides(),
            }),
        );
        serde_json::Value::Object(schema)
    }

    fn compose(&self, catalog: &ModelCatalog, request: &AnalysisRequest) -> Result<CompositeModel> {
        if let Some(model) = request.model.as_deref().filter(|m| *m != MODEL) {
            return Err(SasFitError::InvalidRequest(format!(
                "{} always fits '{MODEL}', not '{model}'",
                self.name()
            )));
        }
        if request.structure_factor.is_some() || !request.structure_factor_params.is_empty() {
            return Err(SasFitError::InvalidRequest(format!(
                "{} does not take a structure factor",
                self.name()
            )));
        }

        let mut overrides = template_overrides();
        for (name, caller) in &request.param_overrides {
            let merged = match overrides.get(name) {
                Some(template) => caller.or(template),
                None => caller.clone(),
            };
            overrides.insert(name.clone(), merged);
        }

        let spec = CompositionSpec {
            param_overrides: overrides,
            polydispersity: request.polydispersity.clone(),
            ..CompositionSpec::new(MODEL)
        };
        compose(catalog, &spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_defaults() {
        let catalog = ModelCatalog::builtin();
        let model = CylinderTemplateFit
            .compose(&catalog, &AnalysisRequest::new("d.csv"))
            .unwrap();
        let params = model.parameters();

        let radius = params.get("radius").unwrap();
        assert_eq!((radius.value, radius.min, radius.max, radius.vary), (20.0, 1.0, 100.0, true));
        assert!(!params.get("sld").unwrap().vary);
        assert_eq!(params.get("sld_solvent").unwrap().value, 1.0);
        assert_eq!(params.varying_count(), 4);
    }

    #[test]
    fn test_caller_overrides_layer_on_template() {
        let catalog = ModelCatalog::builtin();
        let mut request = AnalysisRequest::new("d.csv");
        request
            .param_overrides
            .insert("radius".to_string(), ParameterOverride::value(35.0));
        request.param_overrides.insert(
            "sld".to_string(),
            ParameterOverride {
                vary: Some(true),
                min: Some(0.0),
                max: Some(10.0),
                ..Default::default()
            },
        );

        let model = CylinderTemplateFit.compose(&catalog, &request).unwrap();
        let radius = model.parameters().get("radius").unwrap();
        assert_eq!((radius.value, radius.max), (35.0, 100.0));
        let sld = model.parameters().get("sld").unwrap();
        assert!(sld.vary);
        assert_eq!(sld.value, 4.0);
    }

    #[test]
    fn test_template_rejects_out_of_range_and_other_models() {
        let catalog = ModelCatalog::builtin();
        let mut request = AnalysisRequest::new("d.csv");
        request
            .param_overrides
            .insert("radius".to_string(), ParameterOverride::value(150.0));
        assert!(matches!(
            CylinderTemplateFit.compose(&catalog, &request),
            Err(SasFitError::OutOfBounds { .. })
        ));

        let mut request = AnalysisRequest::new("d.csv");
        request.model = Some("sphere".to_string());
        assert!(matches!(
            CylinderTemplateFit.compose(&catalog, &request),
            Err(SasFitError::InvalidRequest(_))
        ));
    }
}
