//! Named analysis workflows.
//!
//! Each workflow turns an [`AnalysisRequest`] into a composite model, loads the
//! referenced data and hands the fit to the dispatcher. The registry is built
//! from a fixed list at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::ModelCatalog;
use crate::composition::{CompositeModel, RadiusEffectiveMode};
use crate::context::Context;
use crate::data::{resolve_upload, Dataset};
use crate::dispatch::FitJob;
use crate::error::{Result, SasFitError};
use crate::normalize::FitResult;
use crate::parameters::Overrides;
use crate::polydispersity::PolydispersityConfig;

mod custom_model;
mod cylinder_template;

pub use custom_model::CustomModelFit;
pub use cylinder_template::CylinderTemplateFit;

fn default_engine() -> String {
    "bumps".to_string()
}

fn default_true() -> bool {
    true
}

/// Arguments of `run-analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisRequest {
    /// Upload reference: a relative path or a unique file name
    pub input_csv: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub structure_factor: Option<String>,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub param_overrides: Overrides,
    #[serde(default)]
    pub polydispersity: PolydispersityConfig,
    #[serde(default)]
    pub structure_factor_params: Overrides,
    #[serde(default)]
    pub radius_effective_mode: RadiusEffectiveMode,
    #[serde(default = "default_true")]
    pub plot_log_scale: bool,
    /// Scopes upload lookup to the caller's directory
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AnalysisRequest {
    pub fn new(input_csv: &str) -> Self {
        Self {
            input_csv: input_csv.to_string(),
            model: None,
            structure_factor: None,
            engine: default_engine(),
            method: None,
            param_overrides: Overrides::new(),
            polydispersity: PolydispersityConfig::new(),
            structure_factor_params: Overrides::new(),
            radius_effective_mode: RadiusEffectiveMode::default(),
            plot_log_scale: true,
            user_id: None,
        }
    }
}

/// Entry in `list-analyses`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// A named fitting workflow.
#[async_trait]
pub trait Analysis: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON description of the accepted request fields.
    fn parameter_schema(&self) -> serde_json::Value;

    /// Validate the request and build its model; no side effects.
    fn compose(&self, catalog: &ModelCatalog, request: &AnalysisRequest) -> Result<CompositeModel>;

    /// Compose, load the data, and run the fit.
    async fn run(
        &self,
        context: &Context,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> Result<FitResult> {
        let model = self.compose(context.catalog(), &request)?;

        let upload_dir = &context.config().upload_dir;
        let data_path =
            resolve_upload(upload_dir, request.user_id.as_deref(), request.input_csv.trim())?;
        let data = Dataset::from_csv(&data_path)?;
        info!(
            analysis = self.name(),
            model = %model.name(),
            data = %data_path.display(),
            points = data.len(),
            "running analysis"
        );

        let mut job = FitJob::new(model, data, data_path)
            .with_engine(&request.engine, request.method.as_deref());
        job.plot_log_scale = request.plot_log_scale;
        job.cancel = cancel;
        context.dispatcher().dispatch(self.name(), job).await
    }
}

/// Workflows keyed by name.
#[derive(Clone)]
pub struct AnalysisRegistry {
    analyses: BTreeMap<&'static str, Arc<dyn Analysis>>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self {
            analyses: BTreeMap::new(),
        }
    }

    /// The workflows shipped with the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CustomModelFit));
        registry.register(Arc::new(CylinderTemplateFit));
        registry
    }

    pub fn register(&mut self, analysis: Arc<dyn Analysis>) {
        self.analyses.insert(analysis.name(), analysis);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Analysis>> {
        self.analyses
            .get(name)
            .cloned()
            .ok_or_else(|| SasFitError::UnknownAnalysis(name.to_string()))
    }

    pub fn list(&self) -> Vec<AnalysisInfo> {
        self.analyses
            .values()
            .map(|a| AnalysisInfo {
                name: a.name(),
                description: a.description(),
                parameters: a.parameter_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.analyses.keys().copied().collect()
    }
}

impl Default for AnalysisRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRegistry")
            .field("analyses", &self.names())
            .finish()
    }
}

/// Request fields every workflow accepts.
fn common_schema() -> serde_json::Map<String, serde_json::Value> {
    let schema = serde_json::json!({
        "input_csv": {
            "type": "string",
            "required": true,
            "description": "Uploaded data file: relative path or unique file name",
        },
        "engine": {"type": "string", "default": "bumps", "enum": ["bumps", "lmfit"]},
        "method": {
            "type": "string",
            "description": "Engine method; bumps: amoeba|lm|de, \
                            lmfit: leastsq|nelder|differential_evolution",
        },
        "param_overrides": {
            "type": "object",
            "description": "Per-parameter {value, min, max, vary, unit}",
        },
        "plot_log_scale": {"type": "boolean", "default": true},
    });
    match schema {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
