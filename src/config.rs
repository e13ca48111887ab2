//! Process configuration read from the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SasFitError};

pub const RUNS_DIR_VAR: &str = "SANS_PILOT_RUNS_DIR";
pub const UPLOAD_DIR_VAR: &str = "UPLOAD_DIR";
pub const RUN_TIMEOUT_VAR: &str = "SASFIT_RUN_TIMEOUT_SECS";
pub const MAX_ITERATIONS_VAR: &str = "SASFIT_MAX_ITERATIONS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root under which run workspaces are created
    pub runs_dir: PathBuf,
    /// Read-only root of uploaded data files
    pub upload_dir: PathBuf,
    /// Wall-clock limit for one engine run
    pub run_timeout_secs: u64,
    /// Iteration cap applied to every engine run
    pub max_iterations: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("/tmp/sans-pilot-runs"),
            upload_dir: PathBuf::from("/uploads"),
            run_timeout_secs: 900,
            max_iterations: None,
        }
    }
}

impl Config {
    /// Load a `.env` file if present, then read the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(RUNS_DIR_VAR) {
            config.runs_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(UPLOAD_DIR_VAR) {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(secs) = get(RUN_TIMEOUT_VAR) {
            config.run_timeout_secs = match secs.parse::<u64>() {
                Ok(s) if s > 0 => s,
                _ => {
                    return Err(SasFitError::Config(format!(
                        "{RUN_TIMEOUT_VAR} must be a positive integer, got '{secs}'"
                    )))
                }
            };
        }
        if let Some(max) = get(MAX_ITERATIONS_VAR) {
            let max = max.parse::<usize>().map_err(|_| {
                SasFitError::Config(format!("{MAX_ITERATIONS_VAR} must be an integer, got '{max}'"))
            })?;
            config.max_iterations = Some(max);
        }
        Ok(config)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
