//! Types describing a single external command and its result.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Argument prefix whose value must never reach logs or error messages.
const SECRET_ARG_PREFIXES: [&str; 1] = ["--authkey="];

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stdio {
  /// stdout/stderr are captured and returned in [`CommandOutput`].
  #[default]
  Captured,
  /// The child shares the terminal. Used for installers and interactive logins.
  Inherited,
}

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  pub stdio: Stdio,
}

impl Invocation {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
      stdio: Stdio::Captured,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn inherit_stdio(mut self) -> Self {
    self.stdio = Stdio::Inherited;
    self
  }

  /// Full argv, unredacted. Only for matching in tests and for spawning.
  pub fn argv(&self) -> Vec<&str> {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect()
  }
}

impl fmt::Display for Invocation {
  /// Renders the command line with secrets masked.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      match SECRET_ARG_PREFIXES.iter().find(|prefix| arg.starts_with(*prefix)) {
        Some(prefix) => write!(f, " {}<redacted>", prefix)?,
        None if arg.contains(char::is_whitespace) => write!(f, " '{}'", arg)?,
        None => write!(f, " {}", arg)?,
      }
    }
    Ok(())
  }
}

/// What a finished child reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  /// Exit code; `None` when the child was killed by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn ok(stdout: impl Into<String>) -> Self {
    Self {
      code: Some(0),
      stdout: stdout.into(),
      stderr: String::new(),
    }
  }

  pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
    Self {
      code: Some(code),
      stdout: String::new(),
      stderr: stderr.into(),
    }
  }

  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum ExecError {
  /// The program could not be started at all.
  #[error("failed to run `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  /// The program ran and exited unsuccessfully.
  #[error("command failed with exit code {code:?}: `{cmd}`{}", stderr_suffix(.stderr))]
  Failed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },
}

fn stderr_suffix(stderr: &str) -> String {
  let trimmed = stderr.trim();
  if trimmed.is_empty() {
    String::new()
  } else {
    format!(": {}", trimmed)
  }
}
