//! Service convergence through systemd.
//!
//! A service is converged when it is both enabled at boot and active. The two
//! properties are checked and fixed independently. Hosts without `systemctl`
//! (minimal images, containers) are tolerated: the caller gets
//! [`ServiceOutcome::Unmanaged`] and is expected to surface a warning.

use serde::Serialize;
use tracing::{debug, info};

use crate::consts::SYSTEMCTL_BIN;
use crate::error::BootstrapError;
use crate::exec::{CommandRunner, Invocation};
use crate::privilege::Executor;

/// Observed state of a system service. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedService {
  pub name: String,
  pub enabled: bool,
  pub active: bool,
}

impl ManagedService {
  pub fn is_converged(&self) -> bool {
    self.enabled && self.active
  }
}

/// Result of [`ensure_running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
  /// No service manager on this host; nothing was done.
  Unmanaged,
  /// The service is enabled and active; the flags say what this call did.
  Converged { enabled: bool, started: bool },
}

pub fn has_service_manager<R: CommandRunner>(exec: &Executor<R>) -> bool {
  exec.has_command(SYSTEMCTL_BIN)
}

fn systemctl<'a>(args: impl IntoIterator<Item = &'a str>) -> Invocation {
  Invocation::new(SYSTEMCTL_BIN).args(args)
}

/// Query the current state of `name`. Returns `None` without a service manager.
pub async fn query<R: CommandRunner>(exec: &Executor<R>, name: &str) -> Option<ManagedService> {
  if !has_service_manager(exec) {
    return None;
  }
  let enabled = exec.probe(systemctl(["is-enabled", "--quiet", name])).await;
  let active = exec.probe(systemctl(["is-active", "--quiet", name])).await;
  Some(ManagedService {
    name: name.to_string(),
    enabled,
    active,
  })
}

/// Make sure `name` is enabled at boot and currently running.
pub async fn ensure_running<R: CommandRunner>(exec: &Executor<R>, name: &str) -> Result<ServiceOutcome, BootstrapError> {
  let Some(service) = query(exec, name).await else {
    debug!(service = %name, "no service manager found");
    return Ok(ServiceOutcome::Unmanaged);
  };

  let enabled = !service.enabled;
  if enabled {
    info!(service = %name, "enabling service");
    exec.run_privileged(systemctl(["enable", name])).await?;
  }
  let started = !service.active;
  if started {
    info!(service = %name, "starting service");
    exec.run_privileged(systemctl(["start", name])).await?;
  }

  Ok(ServiceOutcome::Converged { enabled, started })
}
