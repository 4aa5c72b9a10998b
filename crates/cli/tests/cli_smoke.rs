//! CLI smoke tests for homelab.
//!
//! Only commands that never mutate the host run here: help, version,
//! `status`, and `apply` failing on its up-front checks.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the homelab binary with a clean environment.
fn homelab_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("homelab");
  cmd.env_remove("HOMELAB_DIR").env_remove("TAILSCALE_AUTH_KEY").env_remove("RUST_LOG");
  cmd
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  homelab_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  homelab_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("homelab"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["apply", "status"] {
    homelab_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("--dir"));
  }
}

#[test]
fn apply_help_lists_flags() {
  homelab_cmd()
    .args(["apply", "--help"])
    .assert()
    .success()
    .stdout(predicate::str::contains("--auth-key"))
    .stdout(predicate::str::contains("--skip-launch"));
}

#[test]
fn auth_key_from_env_is_not_shown_in_help() {
  homelab_cmd()
    .args(["apply", "--help"])
    .env("TAILSCALE_AUTH_KEY", "tskey-auth-secret")
    .assert()
    .success()
    .stdout(predicate::str::contains("tskey-auth-secret").not());
}

#[test]
fn unknown_subcommand_fails() {
  homelab_cmd().arg("frobnicate").assert().failure();
}

// =============================================================================
// status
// =============================================================================

#[test]
#[serial]
fn status_on_empty_dir_succeeds() {
  let temp = TempDir::new().unwrap();

  homelab_cmd()
    .arg("status")
    .env("HOMELAB_DIR", temp.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Homelab directory"))
    .stdout(predicate::str::contains("missing"));
}

#[test]
#[serial]
fn status_json_is_valid() {
  let temp = TempDir::new().unwrap();

  let output = homelab_cmd()
    .args(["status", "--output", "json", "--dir"])
    .arg(temp.path())
    .output()
    .unwrap();

  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["dir_exists"], true);
  assert_eq!(json["env_file"], "missing");
  assert!(json["descriptor"].is_null());
}

// =============================================================================
// apply
// =============================================================================

#[test]
#[serial]
fn apply_with_missing_dir_fails_before_changing_anything() {
  let temp = TempDir::new().unwrap();

  homelab_cmd()
    .args(["apply", "--dir"])
    .arg(temp.path().join("absent"))
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("configuration error"));
}
