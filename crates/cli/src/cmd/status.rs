//! Status command implementation.
//!
//! Observes the host without changing it: privilege, Docker, Tailscale,
//! identity, `.env` and the stack's inputs.

use std::path::PathBuf;

use anyhow::{Context, Result};

use homelab_lib::Settings;
use homelab_lib::exec::SystemRunner;
use homelab_lib::privilege::{self, Privilege};
use homelab_lib::service::ManagedService;
use homelab_lib::status::{EnvSync, HostStatus, observe};

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, print_warning, yes_no};

pub fn cmd_status(dir: Option<PathBuf>, output: OutputFormat) -> Result<()> {
  let settings = Settings::resolve(dir, None).context("Failed to resolve settings")?;
  let status = super::runtime()?.block_on(observe(SystemRunner::new(), &settings, privilege::is_elevated()));

  if output.is_json() {
    print_json(&status)?;
  } else {
    print_status(&status);
  }
  Ok(())
}

fn print_status(status: &HostStatus) {
  print_info(&format!("Homelab directory: {}", status.homelab_dir.display()));
  print_stat("Exists", yes_no(status.dir_exists));
  print_stat(
    "Privilege",
    match status.privilege {
      Some(Privilege::Root) => "root",
      Some(Privilege::Sudo) => "sudo",
      None => "unavailable (not root, no sudo)",
    },
  );
  print_stat(
    "Package manager",
    status.package_manager.map_or("none found", |manager| manager.as_str()),
  );

  println!();
  println!("Docker:");
  print_stat("Installed", yes_no(status.docker.installed));
  if let Some(service) = &status.docker.service {
    print_stat("Service", &service_state(service));
  }
  if status.docker.installed {
    print_stat("Reachable without sudo", yes_no(status.docker.reachable));
    if let Some(member) = status.docker.user_in_group {
      print_stat("User in docker group", yes_no(member));
    }
    print_stat("Compose", yes_no(status.docker.compose));
  }

  println!();
  println!("Tailscale:");
  print_stat("Installed", yes_no(status.tailscale.installed));
  if let Some(service) = &status.tailscale.service {
    print_stat("Service", &service_state(service));
  }
  if let Some(state) = &status.tailscale.backend_state {
    print_stat("Backend", state);
  }
  match (&status.identity, &status.identity_error) {
    (Some(identity), _) => print_stat("Identity", &identity.to_string()),
    (None, Some(err)) => print_stat("Identity", err),
    (None, None) => {}
  }

  println!();
  print_stat(
    ".env",
    match status.env_file {
      EnvSync::InSync => "in sync",
      EnvSync::Stale => "stale",
      EnvSync::Missing => "missing",
      EnvSync::Unknown => "unknown (no identity)",
    },
  );
  match &status.descriptor {
    Some(descriptor) => print_stat("Compose file", &descriptor.display().to_string()),
    None => print_stat("Compose file", "none found"),
  }
  for path in &status.missing_certs {
    print_warning(&format!("Missing certificate file {}", path.display()));
  }

  println!();
  if status.is_converged() {
    print_success("Host is converged");
  } else {
    print_info("Host is not converged; run `homelab apply`");
  }
}

fn service_state(service: &ManagedService) -> String {
  format!(
    "{}, {}",
    if service.enabled { "enabled" } else { "disabled" },
    if service.active { "active" } else { "inactive" }
  )
}
