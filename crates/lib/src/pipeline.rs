//! The bootstrap pipeline.
//!
//! Runs every convergence step in order against one [`Executor`]:
//!
//! 1. Target directory check
//! 2. Base packages
//! 3. Docker subsystem
//! 4. Mesh identity
//! 5. `.env` materialization
//! 6. Certificate presence (advisory)
//! 7. Stack launch
//!
//! The first fatal error aborts the run. Nothing already converged is undone;
//! running again resumes from the host's current state.

use tracing::{debug, info};

use crate::config::Settings;
use crate::consts::BASE_PACKAGES;
use crate::docker;
use crate::error::BootstrapError;
use crate::exec::CommandRunner;
use crate::materialize::{self, EnvConfig, WriteOutcome};
use crate::mesh::{self, MeshIdentity};
use crate::packages::{PackageConvergence, package_set};
use crate::privilege::Executor;
pub use crate::report::{BootstrapReport, Change};
use crate::stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOptions {
  /// Pull and start the stack after materializing its config.
  pub launch: bool,
}

impl Default for BootstrapOptions {
  fn default() -> Self {
    Self { launch: true }
  }
}

/// Converge the host described by `settings`.
pub async fn bootstrap<R: CommandRunner>(
  exec: &Executor<R>,
  settings: &Settings,
  options: BootstrapOptions,
) -> Result<BootstrapReport, BootstrapError> {
  info!(dir = %settings.homelab_dir.display(), privilege = ?exec.privilege(), "starting bootstrap");
  let mut report = BootstrapReport::new();

  if !settings.homelab_dir.is_dir() {
    return Err(BootstrapError::Configuration(format!(
      "{} is not a directory; create it or point HOMELAB_DIR elsewhere",
      settings.homelab_dir.display()
    )));
  }

  let mut packages = PackageConvergence::detect(exec)?;
  let outcome = packages.ensure_installed(exec, &package_set(BASE_PACKAGES)).await?;
  report.record_packages(packages.manager(), &outcome);

  let cli = docker::converge(exec, &mut packages, &settings.user, &mut report).await?;
  report.container_elevated = cli.is_elevated();

  let identity = mesh::acquire(exec, settings.auth_key.as_deref(), &mut report).await?;

  report.env_file = Some(write_identity(settings, &identity, &mut report)?);
  check_certs(settings, &identity, &mut report);
  report.identity = Some(identity);

  if options.launch {
    report.descriptor = Some(stack::launch(exec, cli, &settings.homelab_dir).await?);
  } else {
    debug!("stack launch skipped");
  }

  info!(changes = report.changes.len(), warnings = report.warnings.len(), "bootstrap finished");
  Ok(report)
}

fn write_identity(
  settings: &Settings,
  identity: &MeshIdentity,
  report: &mut BootstrapReport,
) -> Result<WriteOutcome, BootstrapError> {
  let path = settings.env_file();
  let outcome = materialize::write_if_changed(&path, &EnvConfig::from_identity(identity).render())?;
  if outcome == WriteOutcome::Changed {
    report.record(Change::EnvWritten { path });
  }
  Ok(outcome)
}

fn check_certs(settings: &Settings, identity: &MeshIdentity, report: &mut BootstrapReport) {
  let pair = settings.cert_pair(&identity.fqdn);
  for path in pair.missing() {
    report.warn(format!(
      "certificate file {} is missing; TLS for {} will not work until it is provided",
      path.display(),
      identity.fqdn
    ));
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use super::*;
  use crate::privilege::Privilege;
  use crate::util::testutil::{MOCK_USER, MockHost};
  use tempfile::TempDir;

  fn settings(dir: &Path) -> Settings {
    Settings {
      homelab_dir: dir.to_path_buf(),
      auth_key: Some("tskey-auth-abc".into()),
      user: MOCK_USER.into(),
    }
  }

  fn homelab_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("docker-compose.yml"), "services: {}\n").unwrap();
    temp
  }

  #[tokio::test]
  async fn missing_target_dir_fails_before_any_command() {
    let temp = TempDir::new().unwrap();
    let host = MockHost::fresh();
    let exec = Executor::new(&host, Privilege::Sudo);

    let result = bootstrap(&exec, &settings(&temp.path().join("absent")), BootstrapOptions::default()).await;

    assert!(matches!(result, Err(BootstrapError::Configuration(_))));
    assert!(host.calls().is_empty());
  }

  #[tokio::test]
  async fn writes_identity_to_env_file() {
    let temp = homelab_dir();
    let host = MockHost::converged();
    let exec = Executor::new(&host, Privilege::Sudo);

    let report = bootstrap(&exec, &settings(temp.path()), BootstrapOptions::default())
      .await
      .unwrap();

    assert_eq!(
      fs::read_to_string(temp.path().join(".env")).unwrap(),
      "TS_IP=100.64.0.3\nTS_FQDN=pi.tailnet-1234.ts.net\n"
    );
    assert_eq!(report.env_file, Some(WriteOutcome::Changed));
    assert_eq!(report.descriptor, Some(temp.path().join("docker-compose.yml")));
  }

  #[tokio::test]
  async fn missing_certs_are_warnings() {
    let temp = homelab_dir();
    let host = MockHost::converged();
    let exec = Executor::new(&host, Privilege::Sudo);

    let report = bootstrap(&exec, &settings(temp.path()), BootstrapOptions::default())
      .await
      .unwrap();

    let cert_warnings: Vec<_> = report.warnings.iter().filter(|w| w.contains("certificate")).collect();
    assert_eq!(cert_warnings.len(), 2);
  }

  #[tokio::test]
  async fn present_certs_produce_no_warning() {
    let temp = homelab_dir();
    let certs = temp.path().join("config").join("certs");
    fs::create_dir_all(&certs).unwrap();
    fs::write(certs.join("pi.tailnet-1234.ts.net.crt"), "cert").unwrap();
    fs::write(certs.join("pi.tailnet-1234.ts.net.key"), "key").unwrap();
    let host = MockHost::converged();
    let exec = Executor::new(&host, Privilege::Sudo);

    let report = bootstrap(&exec, &settings(temp.path()), BootstrapOptions::default())
      .await
      .unwrap();

    assert!(report.warnings.is_empty());
  }

  #[tokio::test]
  async fn skip_launch_does_not_touch_compose() {
    let temp = TempDir::new().unwrap();
    let host = MockHost::converged();
    let exec = Executor::new(&host, Privilege::Sudo);

    let report = bootstrap(&exec, &settings(temp.path()), BootstrapOptions { launch: false })
      .await
      .unwrap();

    assert_eq!(report.descriptor, None);
    assert_eq!(host.count_calls("compose -f"), 0);
    assert!(temp.path().join(".env").exists());
  }

  #[tokio::test]
  async fn missing_descriptor_fails_after_env_is_written() {
    let temp = TempDir::new().unwrap();
    let host = MockHost::converged();
    let exec = Executor::new(&host, Privilege::Sudo);

    let result = bootstrap(&exec, &settings(temp.path()), BootstrapOptions::default()).await;

    assert!(matches!(result, Err(BootstrapError::Configuration(_))));
    assert!(temp.path().join(".env").exists());
    assert_eq!(host.count_calls("compose -f"), 0);
  }

  #[tokio::test]
  async fn identity_failure_leaves_env_untouched() {
    let temp = homelab_dir();
    let host = MockHost::converged().with_dns_name(Some(""));
    let exec = Executor::new(&host, Privilege::Sudo);

    let result = bootstrap(&exec, &settings(temp.path()), BootstrapOptions::default()).await;

    assert!(matches!(result, Err(BootstrapError::IdentityUnavailable(_))));
    assert!(!temp.path().join(".env").exists());
    assert_eq!(host.count_calls("compose -f"), 0);
  }

  #[tokio::test]
  async fn no_package_manager_is_configuration_error() {
    let temp = homelab_dir();
    let host = MockHost::converged().without_command("apt-get");
    let exec = Executor::new(&host, Privilege::Sudo);

    let result = bootstrap(&exec, &settings(temp.path()), BootstrapOptions::default()).await;

    assert!(matches!(result, Err(BootstrapError::Configuration(_))));
  }
}
