//! Execution of composed fits.
//!
//! The dispatcher owns the run lifecycle: it allocates a workspace, persists the
//! problem, runs the engine on a blocking thread under a wall-clock limit, and
//! turns the engine output into a [`FitResult`].

mod run_id;
mod workspace;

pub use run_id::RunIdAllocator;
pub use workspace::{
    RunState, RunStatus, RunWorkspace, PLOT_FILE, PROBLEM_FILE, RAW_OUTPUT_FILE, STATUS_FILE,
};

use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::composition::CompositeModel;
use crate::control::RunControl;
use crate::data::Dataset;
use crate::engine::{EngineRegistry, FitEngine, FitProblem, RawEngineOutput};
use crate::error::{Result, SasFitError};
use crate::normalize::{normalize, Artifacts, FitResult};
use crate::plot;

/// How long a timed-out engine gets to reach its next checkpoint.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Everything needed to run one fit.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub model: Arc<CompositeModel>,
    pub data: Arc<Dataset>,
    /// Where the data came from, recorded in `problem.json`
    pub data_path: PathBuf,
    pub engine: String,
    pub method: Option<String>,
    pub plot_log_scale: bool,
    /// Cancelling this token stops the engine at its next checkpoint
    pub cancel: CancellationToken,
}

impl FitJob {
    pub fn new(model: CompositeModel, data: Dataset, data_path: impl Into<PathBuf>) -> Self {
        Self {
            model: Arc::new(model),
            data: Arc::new(data),
            data_path: data_path.into(),
            engine: "bumps".to_string(),
            method: None,
            plot_log_scale: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_engine(mut self, engine: &str, method: Option<&str>) -> Self {
        self.engine = engine.to_string();
        self.method = method.map(str::to_string);
        self
    }
}

/// Runs fits in isolated workspaces.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    engines: EngineRegistry,
    runs_root: PathBuf,
    timeout: Duration,
    max_iterations: Option<usize>,
    ids: Arc<RunIdAllocator>,
}

impl Dispatcher {
    pub fn new(engines: EngineRegistry, runs_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            engines,
            runs_root: runs_root.into(),
            timeout,
            max_iterations: None,
            ids: Arc::new(RunIdAllocator::new()),
        }
    }

    /// Cap the iteration count of every engine run.
    pub fn with_max_iterations(mut self, max_iterations: Option<usize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Share a run-id allocator with other dispatchers.
    pub fn with_allocator(mut self, ids: Arc<RunIdAllocator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn runs_root(&self) -> &Path {
        &self.runs_root
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    /// Run `job` as part of `analysis`.
    ///
    /// Engine and method are checked before anything touches the filesystem.
    /// Once the workspace exists, every failure leaves it in place with a
    /// `Failed` or `Cancelled` status and a diagnostic.
    pub async fn dispatch(&self, analysis: &str, job: FitJob) -> Result<FitResult> {
        let engine = self.engines.get(&job.engine)?;
        let method = engine.resolve_method(job.method.as_deref())?;
        let problem = FitProblem::new(Arc::clone(&job.model), Arc::clone(&job.data));
        engine.validate(method, &problem)?;
        problem.initial_internal()?;

        let run_id = self.ids.next_id();
        let mut workspace = RunWorkspace::create(&self.runs_root, analysis, &run_id)?;
        let outcome = self
            .execute(&mut workspace, analysis, engine, method, problem, &job)
            .await;
        outcome.map_err(|err| finish_failed(&mut workspace, err))
    }

    async fn execute(
        &self,
        workspace: &mut RunWorkspace,
        analysis: &str,
        engine: Arc<dyn FitEngine>,
        method: &'static str,
        problem: FitProblem,
        job: &FitJob,
    ) -> Result<FitResult> {
        let run_id = workspace.run_id().to_string();
        let problem_path = workspace.write_json(
            PROBLEM_FILE,
            &json!({
                "run_id": run_id,
                "analysis": analysis,
                "model": &*job.model,
                "data": &job.data_path,
                "n_points": job.data.len(),
                "engine": engine.name(),
                "method": method,
                "created_at": Utc::now(),
            }),
        )?;
        workspace.transition(RunState::Running, None)?;
        info!(
            run_id = %run_id,
            analysis,
            model = %job.model.name(),
            engine = engine.name(),
            method,
            "dispatching fit"
        );

        let control = RunControl::new(job.cancel.clone()).with_max_iterations(self.max_iterations);
        let task_control = control.clone();
        let mut handle =
            tokio::task::spawn_blocking(move || engine.fit(method, &problem, &task_control));

        let outcome = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                control.token().cancel();
                warn!(run_id = %run_id, limit = ?self.timeout, "fit timed out; cancelling engine");
                // Keep whatever the engine reports once it reaches a checkpoint
                if let Ok(Ok(Ok(raw))) = tokio::time::timeout(CANCEL_GRACE, handle).await {
                    if let Err(e) = workspace.write_json(RAW_OUTPUT_FILE, &raw) {
                        warn!(
                            run_id = %run_id,
                            error = %e,
                            "could not keep output of timed-out fit"
                        );
                    }
                }
                return Err(SasFitError::Timeout {
                    limit: self.timeout,
                });
            }
        };

        let raw = match outcome {
            Ok(raw) => raw?,
            Err(join_error) => {
                return Err(SasFitError::OptimizerFailure(format!(
                    "engine task failed: {join_error}"
                )))
            }
        };
        let raw_path = workspace.write_json(RAW_OUTPUT_FILE, &raw)?;

        if raw.aborted {
            info!(
                run_id = %run_id,
                message = %raw.message,
                "engine stopped at a cancellation checkpoint"
            );
            return Err(SasFitError::Cancelled);
        }

        let mut result = normalize(&raw, &job.model, &run_id)?;
        let plot_path = self.render_plot(workspace, job, &raw, &result);
        result.artifacts = Artifacts {
            workspace: Some(workspace.dir().to_path_buf()),
            problem: Some(problem_path),
            raw_output: Some(raw_path),
            plot: plot_path,
        };
        workspace.transition(RunState::Succeeded, None)?;
        info!(
            run_id = %run_id,
            status = ?result.status,
            chisq = result.chisq,
            reduced_chisq = result.reduced_chisq,
            "fit finished"
        );
        Ok(result)
    }

    /// Plot failures are logged and never fail the run.
    fn render_plot(
        &self,
        workspace: &RunWorkspace,
        job: &FitJob,
        raw: &RawEngineOutput,
        result: &FitResult,
    ) -> Option<PathBuf> {
        let values: Vec<f64> = result.parameters.iter().map(|p| p.value).collect();
        let path = workspace.path(PLOT_FILE);
        let title = format!("{} ({}/{})", job.model.name(), raw.engine, raw.method);
        let rendered = job
            .model
            .evaluate(job.data.q(), &values)
            .and_then(|curve| {
                plot::render_fit(&path, &title, &job.data, &curve, job.plot_log_scale)
            });
        match rendered {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(run_id = workspace.run_id(), error = %e, "could not render fit plot");
                None
            }
        }
    }
}

/// Record the terminal state for an error raised after the workspace exists.
///
/// The caller always gets `err` back. A status file that cannot be written is
/// logged, since the run has already failed.
fn finish_failed(workspace: &mut RunWorkspace, err: SasFitError) -> SasFitError {
    if workspace.state().is_terminal() {
        return err;
    }
    let state = if matches!(err, SasFitError::Cancelled) {
        RunState::Cancelled
    } else {
        error!(run_id = workspace.run_id(), kind = %err.kind(), error = %err, "fit failed");
        RunState::Failed
    };
    if let Err(status_err) = workspace.transition(state, Some(err.to_string())) {
        error!(
            run_id = workspace.run_id(),
            error = %status_err,
            "could not record final run state"
        );
    }
    err
}
