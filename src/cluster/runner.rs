//! External command execution.
//!
//! This module defines the process contract every cluster interaction goes
//! through: run a shell command line, capture its exit code and combined
//! output, and fail on a nonzero exit unless the call site opts out.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{CommandError, Result};

/// Whether a nonzero exit status is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Nonzero exit is fatal.
    Check,
    /// Nonzero exit is returned to the caller.
    Ignore,
}

/// Captured result of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code, `-1` if terminated by a signal.
    pub exit_code: i32,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    /// Creates a command output.
    #[must_use]
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    /// Returns true if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Applies `policy` to this output.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Failed`] if the exit code is nonzero and the
    /// policy is [`ExitPolicy::Check`].
    pub fn check(self, command: &str, policy: ExitPolicy) -> Result<Self> {
        if policy == ExitPolicy::Check && !self.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                exit_code: self.exit_code,
                output: self.output,
            }
            .into());
        }
        Ok(self)
    }
}

/// Runs shell command lines.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` and waits for it to exit.
    async fn run(&self, command: &str, policy: ExitPolicy) -> Result<CommandOutput>;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner {
    dry_run: bool,
}

impl ShellRunner {
    /// Creates a shell runner.
    ///
    /// In dry-run mode commands are printed to stdout and never spawned.
    #[must_use]
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Returns true if commands are printed instead of run.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    #[allow(clippy::print_stdout)]
    async fn run(&self, command: &str, policy: ExitPolicy) -> Result<CommandOutput> {
        info!("Running: {}", command);

        if self.dry_run {
            println!("{command}");
            return Ok(CommandOutput::new(0, String::new()));
        }

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| CommandError::spawn(command, e.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let exit_code = output.status.code().unwrap_or(-1);
        debug!("Exit code {} from: {}", exit_code, command);

        CommandOutput::new(exit_code, combined).check(command, policy)
    }
}

#[cfg(test)]
pub(crate) use scripted::ScriptedRunner;
