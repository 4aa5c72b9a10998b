//! Read-only status observation before and after a bootstrap.

use homelab_lib::privilege::{Executor, Privilege};
use homelab_lib::status::{EnvSync, observe};
use homelab_lib::util::testutil::MockHost;
use homelab_lib::{BootstrapOptions, bootstrap};

use super::common::{FQDN, homelab_dir, settings, write_certs};

#[tokio::test]
async fn status_reflects_a_completed_bootstrap() {
  let dir = homelab_dir();
  write_certs(dir.path());
  let settings = settings(dir.path(), Some("tskey-auth-abc"));
  let host = MockHost::fresh();

  let before = observe(&host, &settings, false).await;
  assert!(!before.is_converged());
  assert_eq!(before.env_file, EnvSync::Missing);

  let exec = Executor::new(&host, Privilege::Sudo);
  bootstrap(&exec, &settings, BootstrapOptions::default()).await.unwrap();
  host.clear_calls();

  let after = observe(&host, &settings, false).await;

  assert!(after.is_converged());
  assert_eq!(after.env_file, EnvSync::InSync);
  assert_eq!(after.identity.as_ref().map(|id| id.fqdn.as_str()), Some(FQDN));
  assert!(after.missing_certs.is_empty());
  assert_eq!(after.descriptor, Some(dir.path().join("docker-compose.yml")));
  assert_eq!(after.docker.user_in_group, Some(true));
  // Membership only applies to new sessions.
  assert!(!after.docker.reachable);
  assert!(host.mutating_calls().is_empty());
}

#[tokio::test]
async fn status_serializes_to_json() {
  let dir = homelab_dir();
  let status = observe(MockHost::converged(), &settings(dir.path(), None), false).await;

  let json = serde_json::to_value(&status).unwrap();

  assert_eq!(json["privilege"], "sudo");
  assert_eq!(json["package_manager"], "apt");
  assert_eq!(json["tailscale"]["backend_state"], "Running");
  assert_eq!(json["env_file"], "missing");
  assert_eq!(json["identity"]["fqdn"], FQDN);
}
