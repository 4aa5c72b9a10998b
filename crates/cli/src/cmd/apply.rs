//! Implementation of the `homelab apply` command.
//!
//! Resolves settings and privilege, runs the bootstrap pipeline and prints a
//! summary of what changed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use homelab_lib::exec::SystemRunner;
use homelab_lib::materialize::WriteOutcome;
use homelab_lib::{BootstrapError, BootstrapOptions, BootstrapReport, Settings, bootstrap, privilege};

use crate::output::{format_duration, print_change, print_stat, print_success, print_warning};

/// Execute the apply command.
///
/// Fails on the first fatal condition; steps that already converged stay
/// converged and a re-run picks up from there.
pub fn cmd_apply(dir: Option<PathBuf>, auth_key: Option<String>, skip_launch: bool) -> Result<()> {
  let start = Instant::now();
  let settings = Settings::resolve(dir, auth_key).context("Failed to resolve settings")?;
  info!(settings = ?settings, "resolved settings");

  let options = BootstrapOptions { launch: !skip_launch };
  let report = super::runtime()?
    .block_on(async {
      let exec = privilege::resolve(SystemRunner::new())?;
      let report = bootstrap(&exec, &settings, options).await?;
      Ok::<_, BootstrapError>(report)
    })
    .context("Bootstrap failed")?;

  print_summary(&report, skip_launch, start.elapsed());
  Ok(())
}

/// The lines of the closing summary, apart from the change list.
struct Summary {
  stats: Vec<(&'static str, String)>,
  warnings: Vec<String>,
}

impl Summary {
  fn new(report: &BootstrapReport, skip_launch: bool, elapsed: Duration) -> Self {
    let mut stats = Vec::new();
    if let Some(identity) = &report.identity {
      stats.push(("Identity", identity.to_string()));
    }
    if let Some(outcome) = report.env_file {
      let state = match outcome {
        WriteOutcome::Changed => "updated",
        WriteOutcome::Unchanged => "unchanged",
      };
      stats.push((".env", state.to_string()));
    }
    let access = if report.container_elevated {
      "through sudo until the next login"
    } else {
      "direct"
    };
    stats.push(("Docker access", access.to_string()));
    match &report.descriptor {
      Some(descriptor) => stats.push(("Stack", format!("started from {}", descriptor.display()))),
      None if skip_launch => stats.push(("Stack", "not launched (--skip-launch)".to_string())),
      None => {}
    }
    stats.push(("Duration", format_duration(elapsed)));

    Self {
      stats,
      warnings: report.warnings.clone(),
    }
  }
}

fn print_summary(report: &BootstrapReport, skip_launch: bool, elapsed: Duration) {
  println!();
  if report.is_converged() {
    print_success("Host already converged; nothing changed");
  } else {
    print_success(&format!("Applied {} change(s)", report.changes.len()));
    for change in &report.changes {
      print_change(&change.to_string());
    }
  }
  println!();

  let summary = Summary::new(report, skip_launch, elapsed);
  for (label, value) in &summary.stats {
    print_stat(label, value);
  }
  if !summary.warnings.is_empty() {
    println!();
    for warning in &summary.warnings {
      print_warning(warning);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use homelab_lib::Change;

  fn stat<'a>(summary: &'a Summary, label: &str) -> Option<&'a str> {
    summary
      .stats
      .iter()
      .find(|(name, _)| *name == label)
      .map(|(_, value)| value.as_str())
  }

  #[test]
  fn summary_lists_every_warning_text() {
    let mut report = BootstrapReport::new();
    report.record(Change::UserAddedToGroup {
      user: "pi".into(),
      group: "docker".into(),
    });
    report.warn("added pi to the `docker` group; log out and back in (or run `newgrp docker`) for it to take effect");
    report.warn("certificate missing: /srv/lab/config/certs/pi.ts.net.crt");
    report.container_elevated = true;

    let summary = Summary::new(&report, false, Duration::from_millis(1500));

    assert_eq!(summary.warnings.len(), 2);
    assert!(summary.warnings[0].contains("log out and back in"));
    assert!(summary.warnings[1].contains("certificate missing"));
    assert_eq!(stat(&summary, "Docker access"), Some("through sudo until the next login"));
    assert_eq!(stat(&summary, "Duration"), Some("1s 500ms"));
  }

  #[test]
  fn summary_notes_skipped_launch() {
    let report = BootstrapReport::new();

    let summary = Summary::new(&report, true, Duration::ZERO);

    assert!(summary.warnings.is_empty());
    assert_eq!(stat(&summary, "Stack"), Some("not launched (--skip-launch)"));
    assert_eq!(stat(&summary, "Docker access"), Some("direct"));
    assert_eq!(stat(&summary, "Identity"), None);
  }
}
