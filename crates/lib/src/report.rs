//! Run report: what a bootstrap run changed and what it warned about.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::materialize::WriteOutcome;
use crate::mesh::MeshIdentity;
use crate::packages::{PackageManager, PackageOutcome};
use crate::service::ServiceOutcome;

/// A mutating action performed on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
  IndexRefreshed { manager: PackageManager },
  PackagesInstalled { packages: Vec<String> },
  RuntimeInstalled,
  MeshInstalled,
  ServiceEnabled { service: String },
  ServiceStarted { service: String },
  GroupCreated { group: String },
  UserAddedToGroup { user: String, group: String },
  MeshConnected { interactive: bool },
  EnvWritten { path: PathBuf },
}

impl fmt::Display for Change {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Change::IndexRefreshed { manager } => write!(f, "refreshed {} package index", manager.as_str()),
      Change::PackagesInstalled { packages } => write!(f, "installed packages: {}", packages.join(", ")),
      Change::RuntimeInstalled => write!(f, "installed docker"),
      Change::MeshInstalled => write!(f, "installed tailscale"),
      Change::ServiceEnabled { service } => write!(f, "enabled service {}", service),
      Change::ServiceStarted { service } => write!(f, "started service {}", service),
      Change::GroupCreated { group } => write!(f, "created group {}", group),
      Change::UserAddedToGroup { user, group } => write!(f, "added {} to group {}", user, group),
      Change::MeshConnected { interactive: true } => write!(f, "connected tailscale (interactive login)"),
      Change::MeshConnected { interactive: false } => write!(f, "connected tailscale (auth key)"),
      Change::EnvWritten { path } => write!(f, "wrote {}", path.display()),
    }
  }
}

/// Accumulated outcome of a bootstrap run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
  pub changes: Vec<Change>,
  pub warnings: Vec<String>,
  pub identity: Option<MeshIdentity>,
  pub env_file: Option<WriteOutcome>,
  pub descriptor: Option<PathBuf>,
  /// Whether container commands had to go through sudo.
  pub container_elevated: bool,
}

impl BootstrapReport {
  pub fn new() -> Self {
    Self::default()
  }

  /// True when the run found nothing to change.
  pub fn is_converged(&self) -> bool {
    self.changes.is_empty()
  }

  pub fn record(&mut self, change: Change) {
    self.changes.push(change);
  }

  /// Record an advisory condition. Also emitted as a `warn!` event.
  pub fn warn(&mut self, message: impl Into<String>) {
    let message = message.into();
    warn!("{}", message);
    self.warnings.push(message);
  }

  pub fn record_packages(&mut self, manager: PackageManager, outcome: &PackageOutcome) {
    if outcome.refreshed {
      self.record(Change::IndexRefreshed { manager });
    }
    if !outcome.installed.is_empty() {
      self.record(Change::PackagesInstalled {
        packages: outcome.installed.clone(),
      });
    }
  }

  pub fn record_service(&mut self, service: &str, outcome: ServiceOutcome) {
    match outcome {
      ServiceOutcome::Unmanaged => self.warn(format!(
        "no service manager (systemctl) found; make sure `{}` is running by other means",
        service
      )),
      ServiceOutcome::Converged { enabled, started } => {
        if enabled {
          self.record(Change::ServiceEnabled {
            service: service.to_string(),
          });
        }
        if started {
          self.record(Change::ServiceStarted {
            service: service.to_string(),
          });
        }
      }
    }
  }
}
