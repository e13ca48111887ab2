//! Per-run output directories and the run state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SasFitError};

pub const PROBLEM_FILE: &str = "problem.json";
pub const STATUS_FILE: &str = "status.json";
pub const RAW_OUTPUT_FILE: &str = "raw_output.json";
pub const PLOT_FILE: &str = "fit_plot.svg";

/// Lifecycle of a run: `Pending -> Running -> {Succeeded, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Cancelled)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }
}

/// Contents of `status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub state: RunState,
    pub diagnostic: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A directory owned by exactly one run.
///
/// Created at dispatch start and never removed by the engine, so failed runs
/// keep whatever they produced.
#[derive(Debug)]
pub struct RunWorkspace {
    run_id: String,
    dir: PathBuf,
    state: RunState,
}

impl RunWorkspace {
    /// Create `<runs_root>/<analysis>/<run_id>/` in state `Pending`.
    ///
    /// The leaf directory is created non-recursively, so an existing directory
    /// for the same id is an error rather than shared.
    pub fn create(runs_root: &Path, analysis: &str, run_id: &str) -> Result<Self> {
        let parent = runs_root.join(analysis);
        fs::create_dir_all(&parent)?;
        let dir = parent.join(run_id);
        fs::create_dir(&dir)?;

        let workspace = Self {
            run_id: run_id.to_string(),
            dir,
            state: RunState::Pending,
        };
        workspace.write_status(RunState::Pending, None)?;
        info!(run_id, dir = %workspace.dir.display(), "created run workspace");
        Ok(workspace)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Write `value` as pretty JSON into the workspace.
    pub fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(file);
        fs::write(&path, serde_json::to_vec_pretty(value)?)?;
        debug!(run_id = %self.run_id, file, "wrote workspace file");
        Ok(path)
    }

    /// Move to `next`, rewriting `status.json`. The state only changes once the
    /// file is written.
    pub fn transition(&mut self, next: RunState, diagnostic: Option<String>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SasFitError::InvalidTransition {
                from: self.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.write_status(next, diagnostic)?;
        self.state = next;
        info!(run_id = %self.run_id, state = next.as_str(), "run state changed");
        Ok(())
    }

    fn write_status(&self, state: RunState, diagnostic: Option<String>) -> Result<()> {
        let status = RunStatus {
            run_id: self.run_id.clone(),
            state,
            diagnostic,
            updated_at: Utc::now(),
        };
        self.write_json(STATUS_FILE, &status)?;
        Ok(())
    }
}
