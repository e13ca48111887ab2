//! Process-wide state shared by every request.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analysis::{AnalysisRegistry, AnalysisRequest};
use crate::catalog::ModelCatalog;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::engine::EngineRegistry;
use crate::error::{Result, SasFitError};
use crate::normalize::FitResult;

/// Catalog, workflows, dispatcher and configuration, built once at startup.
///
/// Everything here is read-only after construction; clones share the same
/// catalog and run-id allocator.
#[derive(Debug, Clone)]
pub struct Context {
    catalog: Arc<ModelCatalog>,
    analyses: Arc<AnalysisRegistry>,
    dispatcher: Dispatcher,
    config: Config,
}

impl Context {
    /// Built-in catalog, workflows and engines.
    pub fn new(config: Config) -> Self {
        Self::with_parts(
            ModelCatalog::builtin(),
            AnalysisRegistry::builtin(),
            EngineRegistry::builtin(),
            config,
        )
    }

    pub fn with_parts(
        catalog: ModelCatalog,
        analyses: AnalysisRegistry,
        engines: EngineRegistry,
        config: Config,
    ) -> Self {
        let dispatcher = Dispatcher::new(engines, config.runs_dir.clone(), config.run_timeout())
            .with_max_iterations(config.max_iterations);
        info!(
            models = catalog.len(),
            analyses = ?analyses.names(),
            runs_dir = %config.runs_dir.display(),
            "context ready"
        );
        Self {
            catalog: Arc::new(catalog),
            analyses: Arc::new(analyses),
            dispatcher,
            config,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn analyses(&self) -> &AnalysisRegistry {
        &self.analyses
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the workflow `name` on JSON arguments.
    ///
    /// The name is checked first, so an unknown workflow never touches the
    /// filesystem.
    pub async fn run_analysis(
        &self,
        name: &str,
        parameters: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<FitResult> {
        let analysis = self.analyses.get(name)?;
        let request: AnalysisRequest = serde_json::from_value(parameters)
            .map_err(|e| SasFitError::InvalidRequest(format!("bad parameters for {name}: {e}")))?;
        analysis.run(self, request, cancel).await
    }
}
