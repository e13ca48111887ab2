//! Cooperative cancellation and iteration limits for a single run.

use tokio_util::sync::CancellationToken;

/// Handed to every minimizer; checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancellationToken,
    max_iterations: Option<usize>,
}

impl RunControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            max_iterations: None,
        }
    }

    /// Cap the iteration count of whichever minimizer runs.
    pub fn with_max_iterations(mut self, max_iterations: Option<usize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The configured cap, or `default` when none is set.
    pub fn iteration_limit(&self, default: usize) -> usize {
        self.max_iterations.unwrap_or(default)
    }
}
