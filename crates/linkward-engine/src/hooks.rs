//! Post-up and post-down command execution.
//!
//! A link carries ordered `post_up` and `post_down` command lists. The engine
//! runs them through a [`HookRunner`] after the link is brought up or taken
//! down. `%i` in a command expands to the interface name and blank commands
//! are skipped. A failing command is logged and never fails the operation.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::HookError;

/// Executes one expanded hook command.
#[allow(async_fn_in_trait)]
pub trait HookRunner {
    /// Runs `command` to completion.
    async fn run(&self, command: &str) -> Result<(), HookError>;
}

/// Runs hook commands through a shell (`/bin/sh -c` by default).
#[derive(Debug, Clone)]
pub struct ShellHookRunner {
    shell: String,
    timeout: Duration,
}

impl ShellHookRunner {
    /// Creates a runner using `/bin/sh` with a 30 second limit per command.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Uses a different shell.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Sets the per-command time limit.
    #[must_use]
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = limit;
        self
    }
}

impl Default for ShellHookRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRunner for ShellHookRunner {
    async fn run(&self, command: &str) -> Result<(), HookError> {
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HookError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(HookError::Spawn {
                    command: command.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(HookError::Timeout {
                    command: command.to_string(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(HookError::Failed {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// A runner that accepts every command without executing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHookRunner;

impl HookRunner for NoopHookRunner {
    async fn run(&self, _command: &str) -> Result<(), HookError> {
        Ok(())
    }
}

/// When a hook list runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookPhase {
    PostUp,
    PostDown,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostUp => f.write_str("post_up"),
            Self::PostDown => f.write_str("post_down"),
        }
    }
}

/// Expands `%i` to the interface name. Returns `None` for blank commands.
#[must_use]
pub fn expand_hook(command: &str, interface: &str) -> Option<String> {
    let command = command.trim();
    (!command.is_empty()).then(|| command.replace("%i", interface))
}

/// Runs every command of one phase in order, logging failures.
pub(crate) async fn run_phase<H: HookRunner>(
    runner: &H,
    phase: HookPhase,
    interface: &str,
    commands: &[String],
) {
    for command in commands.iter().filter_map(|c| expand_hook(c, interface)) {
        debug!(link = interface, %phase, command = %command, "running hook");
        if let Err(e) = runner.run(&command).await {
            warn!(link = interface, %phase, error = %e, "hook failed");
        }
    }
}
