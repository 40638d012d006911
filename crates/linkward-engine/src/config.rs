//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the reconciliation [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run the links' post-up and post-down commands.
    pub run_hooks: bool,
    /// Time limit for a single hook command, in milliseconds.
    pub hook_timeout_ms: u64,
    /// Undo the device and route changes of a peer activation whose route
    /// installation failed.
    pub rollback_failed_peer_activation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_hooks: true,
            hook_timeout_ms: 30_000,
            rollback_failed_peer_activation: true,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Enables or disables hook execution.
    #[must_use]
    pub fn with_run_hooks(mut self, run: bool) -> Self {
        self.run_hooks = run;
        self
    }

    /// Sets the per-command hook timeout.
    #[must_use]
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables compensation of failed peer activations.
    #[must_use]
    pub fn with_rollback_failed_peer_activation(mut self, rollback: bool) -> Self {
        self.rollback_failed_peer_activation = rollback;
        self
    }

    /// Returns the per-command hook timeout.
    #[must_use]
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}
