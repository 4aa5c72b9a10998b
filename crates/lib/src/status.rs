//! Read-only observation of a host's bootstrap state.
//!
//! [`observe`] runs only unprivileged queries and never fails: anything that
//! cannot be read is reported as absent.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::certs::CertPair;
use crate::config::Settings;
use crate::consts::{DOCKER_BIN, DOCKER_GROUP, DOCKER_SERVICE, TAILSCALE_BIN, TAILSCALE_SERVICE};
use crate::docker::{self, ContainerCli};
use crate::exec::CommandRunner;
use crate::materialize::EnvConfig;
use crate::mesh::{self, MeshIdentity};
use crate::packages::PackageManager;
use crate::privilege::{self, Executor, Privilege};
use crate::service::{self, ManagedService};
use crate::stack;

/// How `.env` compares with what a bootstrap would write now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSync {
  InSync,
  Stale,
  Missing,
  /// No identity could be read, so the desired content is unknown.
  Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerStatus {
  pub installed: bool,
  pub service: Option<ManagedService>,
  /// `docker info` succeeds without sudo.
  pub reachable: bool,
  /// The login user is in the docker group.
  pub user_in_group: Option<bool>,
  pub compose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshDaemonStatus {
  pub installed: bool,
  pub service: Option<ManagedService>,
  pub backend_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostStatus {
  pub homelab_dir: PathBuf,
  pub dir_exists: bool,
  /// `None` when not root and sudo is missing.
  pub privilege: Option<Privilege>,
  pub package_manager: Option<PackageManager>,
  pub docker: DockerStatus,
  pub tailscale: MeshDaemonStatus,
  pub identity: Option<MeshIdentity>,
  /// Why the identity could not be read.
  pub identity_error: Option<String>,
  pub env_file: EnvSync,
  /// Certificate files absent for the current identity.
  pub missing_certs: Vec<PathBuf>,
  pub descriptor: Option<PathBuf>,
}

impl HostStatus {
  /// True when a bootstrap run would have nothing to do.
  pub fn is_converged(&self) -> bool {
    let service_ok = |service: &Option<ManagedService>| service.as_ref().is_none_or(ManagedService::is_converged);
    self.dir_exists
      && self.docker.installed
      && service_ok(&self.docker.service)
      && self.docker.compose
      && self.tailscale.installed
      && service_ok(&self.tailscale.service)
      && self.identity.is_some()
      && self.env_file == EnvSync::InSync
  }
}

/// Observe the host for `settings`. `elevated` is whether the process runs as root.
pub async fn observe<R: CommandRunner>(runner: R, settings: &Settings, elevated: bool) -> HostStatus {
  let privilege = privilege::detect(&runner, elevated);
  // Only unprivileged reads below; the mode just decides what `is_root` reports.
  let exec = Executor::new(runner, privilege.unwrap_or(Privilege::Sudo));

  let docker = observe_docker(&exec, settings).await;
  let tailscale = observe_mesh(&exec).await;

  let (identity, identity_error) = if tailscale.installed {
    match mesh::read_identity(&exec).await {
      Ok(identity) => (Some(identity), None),
      Err(err) => (None, Some(err.to_string())),
    }
  } else {
    (None, Some("tailscale is not installed".to_string()))
  };

  let env_file = env_sync(settings, identity.as_ref());
  let missing_certs = identity
    .as_ref()
    .map(|identity| missing_certs(&settings.cert_pair(&identity.fqdn)))
    .unwrap_or_default();

  HostStatus {
    homelab_dir: settings.homelab_dir.clone(),
    dir_exists: settings.homelab_dir.is_dir(),
    privilege,
    package_manager: PackageManager::detect(exec.runner()),
    docker,
    tailscale,
    identity,
    identity_error,
    env_file,
    missing_certs,
    descriptor: stack::find_descriptor(&settings.homelab_dir),
  }
}

async fn observe_docker<R: CommandRunner>(exec: &Executor<R>, settings: &Settings) -> DockerStatus {
  if !exec.has_command(DOCKER_BIN) {
    return DockerStatus {
      installed: false,
      service: None,
      reachable: false,
      user_in_group: None,
      compose: false,
    };
  }

  let cli = ContainerCli::direct();
  let user_in_group = if exec.is_root() {
    None
  } else {
    docker::is_member(exec, DOCKER_GROUP, &settings.user)
      .await
      .inspect_err(|err| debug!(error = %err, "group lookup failed"))
      .ok()
  };

  DockerStatus {
    installed: true,
    service: service::query(exec, DOCKER_SERVICE).await,
    reachable: exec.probe(cli.command(["info"])).await,
    user_in_group,
    compose: exec.probe(cli.command(["compose", "version"])).await,
  }
}

async fn observe_mesh<R: CommandRunner>(exec: &Executor<R>) -> MeshDaemonStatus {
  if !exec.has_command(TAILSCALE_BIN) {
    return MeshDaemonStatus {
      installed: false,
      service: None,
      backend_state: None,
    };
  }

  MeshDaemonStatus {
    installed: true,
    service: service::query(exec, TAILSCALE_SERVICE).await,
    backend_state: mesh::read_status(exec).await.and_then(|status| status.backend_state),
  }
}

fn env_sync(settings: &Settings, identity: Option<&MeshIdentity>) -> EnvSync {
  let path = settings.env_file();
  let current = match fs::read(&path) {
    Ok(current) => current,
    Err(err) => {
      debug!(path = %path.display(), error = %err, "env file not readable");
      return EnvSync::Missing;
    }
  };
  match identity {
    None => EnvSync::Unknown,
    Some(identity) if current == EnvConfig::from_identity(identity).render().into_bytes() => EnvSync::InSync,
    Some(_) => EnvSync::Stale,
  }
}

fn missing_certs(pair: &CertPair) -> Vec<PathBuf> {
  pair.missing().into_iter().map(PathBuf::from).collect()
}
