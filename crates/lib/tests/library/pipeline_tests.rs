//! Full bootstrap runs: fresh host, re-run, partial failure and recovery.

use std::fs;

use homelab_lib::exec::CommandRunner;
use homelab_lib::materialize::WriteOutcome;
use homelab_lib::packages::PackageManager;
use homelab_lib::privilege::{Executor, Privilege};
use homelab_lib::util::testutil::{MOCK_USER, MockHost};
use homelab_lib::{BootstrapError, BootstrapOptions, BootstrapReport, Change, Settings, bootstrap};

use super::common::{FQDN, homelab_dir, settings, write_certs};

async fn run<R: CommandRunner>(exec: &Executor<R>, settings: &Settings) -> Result<BootstrapReport, BootstrapError> {
  bootstrap(exec, settings, BootstrapOptions::default()).await
}

#[tokio::test]
async fn fresh_host_converges_then_second_run_changes_nothing() {
  let dir = homelab_dir();
  let settings = settings(dir.path(), Some("tskey-auth-abc"));
  let host = MockHost::fresh();
  let exec = Executor::new(&host, Privilege::Sudo);

  let first = run(&exec, &settings).await.unwrap();

  assert_eq!(
    first.changes,
    vec![
      Change::IndexRefreshed {
        manager: PackageManager::Apt
      },
      Change::PackagesInstalled {
        packages: vec!["ca-certificates".into(), "curl".into(), "jq".into()]
      },
      Change::RuntimeInstalled,
      Change::ServiceEnabled {
        service: "docker".into()
      },
      Change::ServiceStarted {
        service: "docker".into()
      },
      Change::UserAddedToGroup {
        user: MOCK_USER.into(),
        group: "docker".into()
      },
      Change::MeshInstalled,
      Change::ServiceEnabled {
        service: "tailscaled".into()
      },
      Change::ServiceStarted {
        service: "tailscaled".into()
      },
      Change::MeshConnected { interactive: false },
      Change::EnvWritten {
        path: settings.env_file()
      },
    ]
  );
  assert!(first.container_elevated);
  assert_eq!(first.identity.as_ref().map(|id| id.fqdn.as_str()), Some(FQDN));
  assert_eq!(first.descriptor, Some(dir.path().join("docker-compose.yml")));
  assert!(first.warnings.iter().any(|w| w.contains("newgrp docker")));
  assert_eq!(
    fs::read_to_string(settings.env_file()).unwrap(),
    format!("TS_IP=100.64.0.3\nTS_FQDN={}\n", FQDN)
  );

  let mtime = fs::metadata(settings.env_file()).unwrap().modified().unwrap();
  host.clear_calls();

  let second = run(&exec, &settings).await.unwrap();

  assert!(second.is_converged(), "unexpected changes: {:?}", second.changes);
  assert!(host.mutating_calls().is_empty());
  assert_eq!(second.env_file, Some(WriteOutcome::Unchanged));
  assert_eq!(fs::metadata(settings.env_file()).unwrap().modified().unwrap(), mtime);
  assert_eq!(host.count_calls("compose -f"), 2);
  assert!(!second.warnings.iter().any(|w| w.contains("newgrp")));
}

#[tokio::test]
async fn converged_host_only_pulls_and_starts() {
  let dir = homelab_dir();
  write_certs(dir.path());
  let settings = settings(dir.path(), None);
  fs::write(
    settings.env_file(),
    format!("TS_IP=100.64.0.3\nTS_FQDN={}\n", FQDN),
  )
  .unwrap();
  let host = MockHost::converged();
  let exec = Executor::new(&host, Privilege::Sudo);

  let report = run(&exec, &settings).await.unwrap();

  assert!(report.is_converged());
  assert!(report.warnings.is_empty());
  assert!(!report.container_elevated);
  assert_eq!(host.calls_matching("compose -f").len(), 2);
  assert!(host.calls().iter().all(|call| !call.starts_with("sudo")));
}

#[tokio::test]
async fn interactive_login_without_auth_key() {
  let dir = homelab_dir();
  let host = MockHost::fresh();
  let exec = Executor::new(&host, Privilege::Sudo);

  let settings = settings(dir.path(), None);

  let report = run(&exec, &settings).await.unwrap();

  assert!(report.changes.contains(&Change::RuntimeInstalled));
  assert!(report.changes.contains(&Change::MeshInstalled));
  assert!(report.changes.contains(&Change::MeshConnected { interactive: true }));
  assert!(report.warnings.iter().any(|w| w.contains("login URL")));
  assert_eq!(report.warnings.iter().filter(|w| w.contains("certificate")).count(), 2);
  assert_eq!(host.calls_matching("tailscale up"), vec!["sudo tailscale up"]);
  let env_writes = report
    .changes
    .iter()
    .filter(|change| matches!(change, Change::EnvWritten { .. }))
    .count();
  assert_eq!(env_writes, 1);
  assert_eq!(report.descriptor, Some(dir.path().join("docker-compose.yml")));
}

#[tokio::test]
async fn root_run_uses_no_sudo_and_skips_group_membership() {
  let dir = homelab_dir();
  let host = MockHost::fresh().as_root();
  let exec = Executor::new(&host, Privilege::Root);

  let report = run(&exec, &settings(dir.path(), Some("tskey-auth-abc"))).await.unwrap();

  assert!(!report.container_elevated);
  assert!(host.calls().iter().all(|call| !call.starts_with("sudo")));
  assert_eq!(host.count_calls("usermod"), 0);
  assert!(!report.warnings.iter().any(|w| w.contains("newgrp")));
}

#[tokio::test]
async fn package_index_is_refreshed_once_per_run() {
  let dir = homelab_dir();
  let mut state = MockHost::converged().state();
  state.packages.clear();
  state.compose_available = false;
  let host = MockHost::from_state(state);
  let exec = Executor::new(&host, Privilege::Sudo);

  let report = run(&exec, &settings(dir.path(), None)).await.unwrap();

  assert_eq!(host.count_calls("apt-get update"), 1);
  assert_eq!(host.count_calls("apt-get install"), 2);
  assert!(report.changes.contains(&Change::PackagesInstalled {
    packages: vec!["docker-compose-plugin".into()]
  }));
}

#[tokio::test]
async fn failed_step_aborts_and_rerun_resumes() {
  let dir = homelab_dir();
  let settings = settings(dir.path(), Some("tskey-auth-abc"));
  let host = MockHost::fresh().failing("usermod");
  let exec = Executor::new(&host, Privilege::Sudo);

  let result = run(&exec, &settings).await;

  assert!(matches!(result, Err(BootstrapError::Exec(_))));
  assert_eq!(host.count_calls("tailscale"), 0);
  assert!(!settings.env_file().exists());
  assert!(host.unit("docker").is_some_and(|unit| unit.active));

  let mut state = host.state();
  state.failing.clear();
  let host = MockHost::from_state(state);
  let exec = Executor::new(&host, Privilege::Sudo);

  let report = run(&exec, &settings).await.unwrap();

  assert!(!report.changes.contains(&Change::RuntimeInstalled));
  assert!(report.changes.contains(&Change::UserAddedToGroup {
    user: MOCK_USER.into(),
    group: "docker".into()
  }));
  assert!(settings.env_file().exists());
}

#[tokio::test]
async fn unreadable_dns_name_stops_before_env_and_launch() {
  let dir = homelab_dir();
  let settings = settings(dir.path(), None);
  let host = MockHost::converged().with_dns_name(None);
  let exec = Executor::new(&host, Privilege::Sudo);

  let err = run(&exec, &settings).await.unwrap_err();

  assert!(matches!(err, BootstrapError::IdentityUnavailable(_)));
  assert!(err.to_string().contains("MagicDNS"));
  assert!(!settings.env_file().exists());
  assert_eq!(host.count_calls("compose -f"), 0);
}

#[tokio::test]
async fn failed_vendor_install_stops_the_run() {
  for script in ["get.docker.com", "tailscale.com/install.sh"] {
    let dir = homelab_dir();
    let settings = settings(dir.path(), Some("tskey-auth-abc"));
    let host = MockHost::fresh().failing(script);
    let exec = Executor::new(&host, Privilege::Sudo);

    let result = run(&exec, &settings).await;

    assert!(matches!(result, Err(BootstrapError::Exec(_))), "{}", script);
    assert_eq!(host.count_calls("tailscale up"), 0, "{}", script);
    assert_eq!(host.count_calls("compose -f"), 0, "{}", script);
    assert!(!settings.env_file().exists(), "{}", script);
  }
}
