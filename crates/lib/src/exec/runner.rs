//! Process-spawning runner backed by `tokio::process`.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use super::CommandRunner;
use super::types::{CommandOutput, ExecError, Invocation, Stdio};

/// Runs invocations as real child processes, one at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
  pub fn new() -> Self {
    Self
  }
}

impl CommandRunner for SystemRunner {
  async fn run(&self, inv: &Invocation) -> Result<CommandOutput, ExecError> {
    let mut command = Command::new(&inv.program);
    command.args(&inv.args).envs(&inv.env);
    if let Some(dir) = &inv.cwd {
      command.current_dir(dir);
    }

    debug!(cmd = %inv, stdio = ?inv.stdio, "spawning process");

    let spawn_err = |source| ExecError::Spawn {
      cmd: inv.to_string(),
      source,
    };

    let output = match inv.stdio {
      Stdio::Captured => {
        let output = command.output().await.map_err(spawn_err)?;
        CommandOutput {
          code: output.status.code(),
          stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
          stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
      }
      Stdio::Inherited => {
        let status = command.status().await.map_err(spawn_err)?;
        CommandOutput {
          code: status.code(),
          ..CommandOutput::default()
        }
      }
    };

    if !output.stderr.is_empty() {
      debug!(stderr = %output.stderr.trim(), "command stderr");
    }
    if !output.stdout.is_empty() {
      debug!(stdout = %output.stdout.trim(), "command stdout");
    }

    Ok(output)
  }

  fn has_command(&self, name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
      return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
  }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  path
    .metadata()
    .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
  path.is_file()
}
