//! System package convergence.
//!
//! [`PackageConvergence`] is created once per run. It installs only the
//! packages the host database reports missing, and refreshes the package
//! index at most once over its lifetime no matter how often it is asked to
//! install something.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::BootstrapError;
use crate::exec::{CommandOutput, CommandRunner, Invocation};
use crate::privilege::Executor;

/// Package managers the bootstrap knows how to drive, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
  Apt,
  Dnf,
  Pacman,
  Apk,
}

impl PackageManager {
  const ALL: [PackageManager; 4] = [Self::Apt, Self::Dnf, Self::Pacman, Self::Apk];

  /// First manager whose binary is on `PATH`.
  pub fn detect<R: CommandRunner>(runner: &R) -> Option<Self> {
    Self::ALL.into_iter().find(|manager| runner.has_command(manager.binary()))
  }

  pub fn binary(&self) -> &'static str {
    match self {
      Self::Apt => "apt-get",
      Self::Dnf => "dnf",
      Self::Pacman => "pacman",
      Self::Apk => "apk",
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Apt => "apt",
      Self::Dnf => "dnf",
      Self::Pacman => "pacman",
      Self::Apk => "apk",
    }
  }

  /// Unprivileged query for a single package.
  fn query(&self, name: &str) -> Invocation {
    match self {
      Self::Apt => Invocation::new("dpkg-query").args(["-W", "-f=${Status}", name]),
      Self::Dnf => Invocation::new("rpm").args(["-q", name]),
      Self::Pacman => Invocation::new("pacman").args(["-Q", name]),
      Self::Apk => Invocation::new("apk").args(["info", "-e", name]),
    }
  }

  fn is_installed(&self, output: &CommandOutput) -> bool {
    match self {
      // dpkg keeps records for removed packages ("deinstall ok config-files",
      // "unknown ok not-installed"), so the exit code alone is not enough.
      Self::Apt => output.success() && output.stdout.trim().ends_with(" installed"),
      Self::Dnf | Self::Pacman | Self::Apk => output.success(),
    }
  }

  fn refresh(&self) -> Invocation {
    match self {
      Self::Apt => Invocation::new("apt-get").arg("update"),
      Self::Dnf => Invocation::new("dnf").arg("makecache"),
      Self::Pacman => Invocation::new("pacman").arg("-Sy"),
      Self::Apk => Invocation::new("apk").arg("update"),
    }
  }

  fn install(&self, names: &[String]) -> Invocation {
    let inv = match self {
      Self::Apt => Invocation::new("apt-get")
        .args(["install", "-y"])
        .env("DEBIAN_FRONTEND", "noninteractive"),
      Self::Dnf => Invocation::new("dnf").args(["install", "-y"]),
      Self::Pacman => Invocation::new("pacman").args(["-S", "--noconfirm", "--needed"]),
      Self::Apk => Invocation::new("apk").arg("add"),
    };
    inv.args(names.iter().cloned())
  }
}

/// What a call to [`PackageConvergence::ensure_installed`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageOutcome {
  /// Whether this call performed the run's index refresh.
  pub refreshed: bool,
  /// Packages installed by this call, sorted.
  pub installed: Vec<String>,
}

impl PackageOutcome {
  pub fn is_noop(&self) -> bool {
    !self.refreshed && self.installed.is_empty()
  }
}

/// Run-scoped package convergence state.
#[derive(Debug)]
pub struct PackageConvergence {
  manager: PackageManager,
  index_refreshed: bool,
}

impl PackageConvergence {
  pub fn new(manager: PackageManager) -> Self {
    Self {
      manager,
      index_refreshed: false,
    }
  }

  /// Detect the host package manager.
  pub fn detect<R: CommandRunner>(exec: &Executor<R>) -> Result<Self, BootstrapError> {
    PackageManager::detect(exec.runner()).map(Self::new).ok_or_else(|| {
      BootstrapError::Configuration("no supported package manager found (looked for apt-get, dnf, pacman, apk)".into())
    })
  }

  pub fn manager(&self) -> PackageManager {
    self.manager
  }

  pub fn index_refreshed(&self) -> bool {
    self.index_refreshed
  }

  /// The subset of `names` not currently installed, sorted.
  pub async fn missing<R: CommandRunner>(
    &self,
    exec: &Executor<R>,
    names: &BTreeSet<String>,
  ) -> Result<Vec<String>, BootstrapError> {
    let mut missing = Vec::new();
    for name in names {
      let output = exec.capture(&self.manager.query(name)).await?;
      let installed = self.manager.is_installed(&output);
      debug!(package = %name, installed, "queried package");
      if !installed {
        missing.push(name.clone());
      }
    }
    Ok(missing)
  }

  /// Install whatever part of `names` is missing.
  pub async fn ensure_installed<R: CommandRunner>(
    &mut self,
    exec: &Executor<R>,
    names: &BTreeSet<String>,
  ) -> Result<PackageOutcome, BootstrapError> {
    let missing = self.missing(exec, names).await?;
    if missing.is_empty() {
      debug!(count = names.len(), "all packages already installed");
      return Ok(PackageOutcome::default());
    }

    let mut outcome = PackageOutcome::default();
    if !self.index_refreshed {
      info!(manager = self.manager.as_str(), "refreshing package index");
      exec.run_privileged(self.manager.refresh()).await?;
      self.index_refreshed = true;
      outcome.refreshed = true;
    }

    info!(packages = ?missing, "installing packages");
    exec.run_privileged(self.manager.install(&missing)).await?;
    outcome.installed = missing;
    Ok(outcome)
  }
}

/// Build a package set from string literals.
pub fn package_set<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
  names.into_iter().map(str::to_string).collect()
}
