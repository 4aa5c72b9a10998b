//! Docker subsystem convergence.
//!
//! Produces a [`ContainerCli`]: the command prefix (bare `docker` or
//! `sudo docker`) every later container command must use. The steps, each
//! idempotent:
//!
//! 1. Install Docker through the vendor script when `docker` is absent
//! 2. Enable and start the `docker` service
//! 3. Create the `docker` group when missing
//! 4. When not root, add the invoking user to that group
//! 5. Probe daemon access, falling back to sudo for the rest of the run
//! 6. Make sure `docker compose` works, installing the plugin if needed
//!
//! Group membership granted in step 4 only applies to new login sessions,
//! which is why step 5 exists.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::consts::{COMPOSE_PLUGIN_PACKAGE, DOCKER_BIN, DOCKER_GROUP, DOCKER_INSTALL_SCRIPT, DOCKER_SERVICE};
use crate::error::BootstrapError;
use crate::exec::{CommandRunner, ExecError, Invocation};
use crate::packages::PackageConvergence;
use crate::privilege::{Executor, Privilege};
use crate::report::{BootstrapReport, Change};
use crate::service;

/// How container commands are invoked for the rest of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContainerCli {
  elevated: bool,
}

impl ContainerCli {
  pub fn direct() -> Self {
    Self { elevated: false }
  }

  pub fn elevated() -> Self {
    Self { elevated: true }
  }

  pub fn is_elevated(&self) -> bool {
    self.elevated
  }

  /// A `docker` invocation with the given arguments.
  pub fn command<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Invocation {
    Invocation::new(DOCKER_BIN).args(args)
  }

  /// Run through the resolved prefix; non-zero exit is an error.
  pub async fn run<R: CommandRunner>(&self, exec: &Executor<R>, inv: Invocation) -> Result<String, ExecError> {
    if self.elevated {
      exec.run_privileged(inv).await
    } else {
      exec.run(inv).await
    }
  }

  pub async fn probe<R: CommandRunner>(&self, exec: &Executor<R>, inv: Invocation) -> bool {
    if self.elevated {
      exec.probe_privileged(inv).await
    } else {
      exec.probe(inv).await
    }
  }
}

/// Converge the Docker subsystem for `user` and return the container prefix.
pub async fn converge<R: CommandRunner>(
  exec: &Executor<R>,
  packages: &mut PackageConvergence,
  user: &str,
  report: &mut BootstrapReport,
) -> Result<ContainerCli, BootstrapError> {
  ensure_runtime_installed(exec, report).await?;

  let outcome = service::ensure_running(exec, DOCKER_SERVICE).await?;
  report.record_service(DOCKER_SERVICE, outcome);

  ensure_group(exec, DOCKER_GROUP, report).await?;
  if !exec.is_root() {
    ensure_membership(exec, DOCKER_GROUP, user, report).await?;
  }

  let cli = resolve_access(exec).await?;
  ensure_compose(exec, packages, cli, report).await?;
  Ok(cli)
}

async fn ensure_runtime_installed<R: CommandRunner>(
  exec: &Executor<R>,
  report: &mut BootstrapReport,
) -> Result<(), BootstrapError> {
  if exec.has_command(DOCKER_BIN) {
    debug!("docker already installed");
    return Ok(());
  }

  info!("installing docker via get.docker.com");
  exec
    .run_privileged(
      Invocation::new("sh")
        .args(["-c", DOCKER_INSTALL_SCRIPT])
        .inherit_stdio(),
    )
    .await?;

  if !exec.has_command(DOCKER_BIN) {
    return Err(BootstrapError::Configuration(
      "docker install script finished but `docker` is still not on PATH".into(),
    ));
  }
  report.record(Change::RuntimeInstalled);
  Ok(())
}

/// Create `group` when `getent` does not know it.
pub async fn ensure_group<R: CommandRunner>(
  exec: &Executor<R>,
  group: &str,
  report: &mut BootstrapReport,
) -> Result<(), BootstrapError> {
  if exec.probe(Invocation::new("getent").args(["group", group])).await {
    debug!(group, "group exists");
    return Ok(());
  }

  info!(group, "creating group");
  exec.run_privileged(Invocation::new("groupadd").arg(group)).await?;
  report.record(Change::GroupCreated {
    group: group.to_string(),
  });
  Ok(())
}

/// Whether `user` is listed in `group` according to `id -nG`.
pub async fn is_member<R: CommandRunner>(exec: &Executor<R>, group: &str, user: &str) -> Result<bool, BootstrapError> {
  let groups = exec.run(Invocation::new("id").args(["-nG", user])).await?;
  Ok(groups.split_whitespace().any(|name| name == group))
}

/// Add `user` to `group` when not already a member.
///
/// Adding a member always produces a warning: the new membership is only
/// visible to login sessions started afterwards.
pub async fn ensure_membership<R: CommandRunner>(
  exec: &Executor<R>,
  group: &str,
  user: &str,
  report: &mut BootstrapReport,
) -> Result<(), BootstrapError> {
  if is_member(exec, group, user).await? {
    debug!(group, user, "user already in group");
    return Ok(());
  }

  info!(group, user, "adding user to group");
  exec
    .run_privileged(Invocation::new("usermod").args(["-aG", group, user]))
    .await?;
  report.record(Change::UserAddedToGroup {
    user: user.to_string(),
    group: group.to_string(),
  });
  report.warn(format!(
    "added {} to the `{}` group; log out and back in (or run `newgrp {}`) for it to take effect",
    user, group, group
  ));
  Ok(())
}

/// Probe the daemon and pick the container prefix.
pub async fn resolve_access<R: CommandRunner>(exec: &Executor<R>) -> Result<ContainerCli, BootstrapError> {
  let docker_info = || ContainerCli::direct().command(["info"]);

  if exec.probe(docker_info()).await {
    debug!("docker daemon reachable without sudo");
    return Ok(ContainerCli::direct());
  }

  match exec.privilege() {
    Privilege::Sudo => {
      if exec.probe_privileged(docker_info()).await {
        info!("docker daemon only reachable through sudo; using sudo for container commands");
        Ok(ContainerCli::elevated())
      } else {
        Err(BootstrapError::RuntimeAccess(
          "`docker info` failed with and without sudo; is the docker daemon running?".into(),
        ))
      }
    }
    Privilege::Root => Err(BootstrapError::RuntimeAccess(
      "`docker info` failed as root; is the docker daemon running?".into(),
    )),
  }
}

async fn ensure_compose<R: CommandRunner>(
  exec: &Executor<R>,
  packages: &mut PackageConvergence,
  cli: ContainerCli,
  report: &mut BootstrapReport,
) -> Result<(), BootstrapError> {
  let version = || cli.command(["compose", "version"]);

  if cli.probe(exec, version()).await {
    debug!("docker compose available");
    return Ok(());
  }

  info!("docker compose missing; installing plugin");
  let plugin = BTreeSet::from([COMPOSE_PLUGIN_PACKAGE.to_string()]);
  let outcome = packages.ensure_installed(exec, &plugin).await?;
  report.record_packages(packages.manager(), &outcome);

  if !cli.probe(exec, version()).await {
    return Err(BootstrapError::Configuration(
      "`docker compose version` still fails after installing the compose plugin".into(),
    ));
  }
  Ok(())
}
