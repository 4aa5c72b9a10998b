//! Launching the deployment stack with `docker compose`.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::consts::COMPOSE_DESCRIPTORS;
use crate::docker::ContainerCli;
use crate::error::BootstrapError;
use crate::exec::{CommandRunner, Invocation};
use crate::privilege::Executor;

/// First compose descriptor present in `dir`, in [`COMPOSE_DESCRIPTORS`] order.
pub fn find_descriptor(dir: &Path) -> Option<PathBuf> {
  COMPOSE_DESCRIPTORS
    .iter()
    .map(|name| dir.join(name))
    .find(|path| path.is_file())
}

/// `docker compose -f <descriptor> <args>` run from `dir`.
pub fn compose_invocation<'a>(
  cli: ContainerCli,
  descriptor: &Path,
  dir: &Path,
  args: impl IntoIterator<Item = &'a str>,
) -> Invocation {
  cli
    .command(["compose", "-f"])
    .arg(descriptor.to_string_lossy())
    .args(args)
    .cwd(dir)
}

/// Pull images and bring the stack up. Returns the descriptor used.
pub async fn launch<R: CommandRunner>(
  exec: &Executor<R>,
  cli: ContainerCli,
  dir: &Path,
) -> Result<PathBuf, BootstrapError> {
  let descriptor = find_descriptor(dir).ok_or_else(|| {
    BootstrapError::Configuration(format!(
      "no compose file in {} (looked for {})",
      dir.display(),
      COMPOSE_DESCRIPTORS.join(", ")
    ))
  })?;

  info!(descriptor = %descriptor.display(), "pulling images");
  cli
    .run(exec, compose_invocation(cli, &descriptor, dir, ["pull"]).inherit_stdio())
    .await?;

  info!(descriptor = %descriptor.display(), "starting stack");
  cli
    .run(
      exec,
      compose_invocation(cli, &descriptor, dir, ["up", "-d", "--remove-orphans"]).inherit_stdio(),
    )
    .await?;

  Ok(descriptor)
}
