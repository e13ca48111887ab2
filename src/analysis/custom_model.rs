use async_trait::async_trait;
use serde_json::json;

use super::{common_schema, Analysis, AnalysisRequest};
use crate::catalog::ModelCatalog;
use crate::composition::{compose, CompositeModel, CompositionSpec};
use crate::error::{Result, SasFitError};

/// Fit any catalog form factor, optionally with a structure factor and size
/// distributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomModelFit;

#[async_trait]
impl Analysis for CustomModelFit {
    fn name(&self) -> &'static str {
        "fitting-with-custom-model"
    }

    fn description(&self) -> &'static str {
        "Fit data with a catalog form factor. Use list-models for names, get-model-parameters for \
         defaults and get-polydisperse-parameters for parameters that accept a size distribution. \
         Set vary=true on the parameters to fit."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        let mut schema = common_schema();
        schema.insert(
            "model".to_string(),
            json!({"type": "string", "required": true, "description": "Form factor name"}),
        );
        schema.insert(
            "structure_factor".to_string(),
            json!({"type": "string", "description": "Optional structure factor name"}),
        );
        schema.insert(
            "structure_factor_params".to_string(),
            json!({
                "type": "object",
                "description": "Overrides for the structure factor's own parameters",
            }),
        );
        schema.insert(
            "radius_effective_mode".to_string(),
            json!({
                "type": "string",
                "enum": ["unconstrained", "link_radius"],
                "default": "unconstrained",
            }),
        );
        schema.insert(
            "polydispersity".to_string(),
            json!({
                "type": "object",
                "description": "Per-parameter {pd_type, pd_width, pd_n, pd_nsigma, vary}",
            }),
        );
        serde_json::Value::Object(schema)
    }

    fn compose(&self, catalog: &ModelCatalog, request: &AnalysisRequest) -> Result<CompositeModel> {
        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                SasFitError::InvalidRequest(format!("{} requires 'model'", self.name()))
            })?;

        let spec = CompositionSpec {
            model: model.to_string(),
            param_overrides: request.param_overrides.clone(),
            structure_factor: request.structure_factor.clone(),
            structure_factor_params: request.structure_factor_params.clone(),
            polydispersity: request.polydispersity.clone(),
            radius_effective_mode: request.radius_effective_mode,
        };
        compose(catalog, &spec)
    }
}
