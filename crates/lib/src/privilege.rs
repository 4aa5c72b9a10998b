//! Privilege resolution and the run-wide [`Executor`].
//!
//! The privilege decision is made exactly once per run. Everything that needs
//! root goes through [`Executor::run_privileged`] or
//! [`Executor::probe_privileged`], which prefix `sudo` when the process is not
//! already root.

use serde::Serialize;
use tracing::{debug, info};

use crate::consts::SUDO_BIN;
use crate::error::BootstrapError;
use crate::exec::{CommandOutput, CommandRunner, ExecError, Invocation};

/// How privileged commands are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
  /// The process already runs as root; commands run directly.
  Root,
  /// Commands needing root are wrapped in `sudo`.
  Sudo,
}

/// Whether the current process runs with an effective uid of 0.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  rustix::process::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}

/// Work out the privilege mode without failing.
///
/// Returns `None` when not root and no `sudo` is available.
pub fn detect<R: CommandRunner>(runner: &R, elevated: bool) -> Option<Privilege> {
  if elevated {
    Some(Privilege::Root)
  } else if runner.has_command(SUDO_BIN) {
    Some(Privilege::Sudo)
  } else {
    None
  }
}

/// Resolve the run's executor for the current process.
pub fn resolve<R: CommandRunner>(runner: R) -> Result<Executor<R>, BootstrapError> {
  resolve_with(runner, is_elevated())
}

/// Resolve the run's executor given whether the process is already root.
pub fn resolve_with<R: CommandRunner>(runner: R, elevated: bool) -> Result<Executor<R>, BootstrapError> {
  let privilege = detect(&runner, elevated).ok_or_else(|| {
    BootstrapError::Configuration("not running as root and `sudo` is not installed; re-run as root".to_string())
  })?;
  info!(privilege = ?privilege, "resolved privilege mode");
  Ok(Executor::new(runner, privilege))
}

/// The single capability through which every command of a run is executed.
#[derive(Debug)]
pub struct Executor<R> {
  runner: R,
  privilege: Privilege,
}

impl<R: CommandRunner> Executor<R> {
  pub fn new(runner: R, privilege: Privilege) -> Self {
    Self { runner, privilege }
  }

  pub fn privilege(&self) -> Privilege {
    self.privilege
  }

  pub fn is_root(&self) -> bool {
    self.privilege == Privilege::Root
  }

  pub fn runner(&self) -> &R {
    &self.runner
  }

  pub fn has_command(&self, name: &str) -> bool {
    self.runner.has_command(name)
  }

  /// Rewrite `inv` so it runs as root.
  ///
  /// Under sudo, environment overrides are passed through `env` since sudo
  /// resets the environment of its child.
  pub fn elevate(&self, inv: Invocation) -> Invocation {
    if self.is_root() {
      return inv;
    }
    let mut elevated = Invocation::new(SUDO_BIN);
    if !inv.env.is_empty() {
      elevated = elevated
        .arg("env")
        .args(inv.env.iter().map(|(key, value)| format!("{}={}", key, value)));
    }
    elevated.args = elevated
      .args
      .into_iter()
      .chain(std::iter::once(inv.program))
      .chain(inv.args)
      .collect();
    elevated.cwd = inv.cwd;
    elevated.stdio = inv.stdio;
    elevated
  }

  /// Run without elevation and return the raw output.
  pub async fn capture(&self, inv: &Invocation) -> Result<CommandOutput, ExecError> {
    self.runner.run(inv).await
  }

  /// Run without elevation; a non-zero exit is an error. Returns trimmed stdout.
  pub async fn run(&self, inv: Invocation) -> Result<String, ExecError> {
    let output = self.runner.run(&inv).await?;
    if !output.success() {
      return Err(ExecError::Failed {
        cmd: inv.to_string(),
        code: output.code,
        stderr: output.stderr,
      });
    }
    Ok(output.stdout.trim().to_string())
  }

  /// Run as root; a non-zero exit is an error. Returns trimmed stdout.
  pub async fn run_privileged(&self, inv: Invocation) -> Result<String, ExecError> {
    self.run(self.elevate(inv)).await
  }

  /// Whether `inv` exits successfully. A program that cannot be spawned counts as failure.
  pub async fn probe(&self, inv: Invocation) -> bool {
    match self.runner.run(&inv).await {
      Ok(output) => output.success(),
      Err(err) => {
        debug!(error = %err, "probe could not run");
        false
      }
    }
  }

  /// Like [`Executor::probe`], but as root.
  pub async fn probe_privileged(&self, inv: Invocation) -> bool {
    self.probe(self.elevate(inv)).await
  }
}
