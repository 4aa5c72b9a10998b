//! Tailscale installation, connection and identity acquisition.
//!
//! Acquisition walks a small state machine:
//!
//! ```text
//! NotInstalled -> Installed -> DaemonUp -> Connected -> IdentityReady
//!                                  \-> Disconnected -/
//! ```
//!
//! Each transition re-probes the host, so a run that died halfway simply
//! resumes from whatever state the host is in.

mod status;

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;
use tracing::{debug, info};

pub use status::{BACKEND_RUNNING, MeshStatus, SelfNode};

use crate::consts::{TAILSCALE_BIN, TAILSCALE_INSTALL_SCRIPT, TAILSCALE_SERVICE};
use crate::error::BootstrapError;
use crate::exec::{CommandRunner, Invocation};
use crate::privilege::Executor;
use crate::report::{BootstrapReport, Change};
use crate::service;

const IDENTITY_GUIDANCE: &str =
  "make sure tailscale is connected (`tailscale status`) and MagicDNS is enabled for the tailnet";

/// The host's address and DNS name on the tailnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshIdentity {
  pub address: Ipv4Addr,
  /// Fully qualified DNS name without the trailing dot.
  pub fqdn: String,
}

impl MeshIdentity {
  /// Validate raw values read from the daemon.
  ///
  /// Both values must be present and non-empty, and the address must be IPv4.
  /// A single trailing dot is stripped from the DNS name.
  pub fn from_parts(address: Option<&str>, dns_name: Option<&str>) -> Result<Self, BootstrapError> {
    let address = match address {
      None => return Err(unavailable("tailscale reported no IPv4 address")),
      Some("") => return Err(unavailable("tailscale reported an empty IPv4 address")),
      Some(raw) => raw
        .parse::<Ipv4Addr>()
        .map_err(|_| unavailable(&format!("`{}` is not an IPv4 address", raw)))?,
    };

    let fqdn = match dns_name {
      None => return Err(unavailable("tailscale status has no Self.DNSName")),
      Some(raw) => raw.strip_suffix('.').unwrap_or(raw),
    };
    if fqdn.is_empty() {
      return Err(unavailable("tailscale status has an empty Self.DNSName"));
    }

    Ok(Self {
      address,
      fqdn: fqdn.to_string(),
    })
  }
}

impl fmt::Display for MeshIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.fqdn, self.address)
  }
}

fn unavailable(reason: &str) -> BootstrapError {
  BootstrapError::IdentityUnavailable(format!("{}; {}", reason, IDENTITY_GUIDANCE))
}

/// Where the host stands on the way to a usable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshState {
  NotInstalled,
  Installed,
  DaemonUp,
  Disconnected,
  Connected,
  IdentityReady(MeshIdentity),
}

/// Read and parse `tailscale status --json`.
///
/// Returns `None` when the command fails or prints something unparseable,
/// which callers treat as "not running".
pub async fn read_status<R: CommandRunner>(exec: &Executor<R>) -> Option<MeshStatus> {
  let output = match exec.capture(&Invocation::new(TAILSCALE_BIN).args(["status", "--json"])).await {
    Ok(output) if output.success() => output,
    Ok(output) => {
      debug!(code = ?output.code, stderr = %output.stderr.trim(), "tailscale status failed");
      return None;
    }
    Err(err) => {
      debug!(error = %err, "tailscale status could not run");
      return None;
    }
  };

  match MeshStatus::parse(&output.stdout) {
    Ok(status) => Some(status),
    Err(err) => {
      debug!(error = %err, "tailscale status output is not valid JSON");
      None
    }
  }
}

/// First line of `tailscale ip -4`, or `None` when the command fails.
pub async fn read_address<R: CommandRunner>(exec: &Executor<R>) -> Option<String> {
  let output = exec
    .capture(&Invocation::new(TAILSCALE_BIN).args(["ip", "-4"]))
    .await
    .ok()
    .filter(|output| output.success())?;
  Some(output.stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Read the identity of a connected daemon.
pub async fn read_identity<R: CommandRunner>(exec: &Executor<R>) -> Result<MeshIdentity, BootstrapError> {
  let address = read_address(exec).await;
  let status = read_status(exec).await;
  let dns_name = status.as_ref().and_then(MeshStatus::dns_name);
  MeshIdentity::from_parts(address.as_deref(), dns_name)
}

/// Connect the daemon, with `auth_key` when given, interactively otherwise.
pub async fn connect<R: CommandRunner>(
  exec: &Executor<R>,
  auth_key: Option<&str>,
  report: &mut BootstrapReport,
) -> Result<(), BootstrapError> {
  let up = Invocation::new(TAILSCALE_BIN).arg("up");
  match auth_key {
    Some(key) => {
      info!("connecting tailscale with auth key");
      exec.run_privileged(up.arg(format!("--authkey={}", key))).await?;
    }
    None => {
      report.warn("no auth key set; `tailscale up` may print a login URL that must be opened to finish connecting");
      exec.run_privileged(up.inherit_stdio()).await?;
    }
  }
  report.record(Change::MeshConnected {
    interactive: auth_key.is_none(),
  });
  Ok(())
}

/// Drive the host from whatever state it is in to a validated identity.
pub async fn acquire<R: CommandRunner>(
  exec: &Executor<R>,
  auth_key: Option<&str>,
  report: &mut BootstrapReport,
) -> Result<MeshIdentity, BootstrapError> {
  let mut state = if exec.has_command(TAILSCALE_BIN) {
    MeshState::Installed
  } else {
    MeshState::NotInstalled
  };

  loop {
    debug!(state = ?state, "mesh state");
    state = match state {
      MeshState::NotInstalled => {
        info!("installing tailscale via tailscale.com/install.sh");
        exec
          .run_privileged(
            Invocation::new("sh")
              .args(["-c", TAILSCALE_INSTALL_SCRIPT])
              .inherit_stdio(),
          )
          .await?;
        if !exec.has_command(TAILSCALE_BIN) {
          return Err(BootstrapError::Configuration(
            "tailscale install script finished but `tailscale` is still not on PATH".into(),
          ));
        }
        report.record(Change::MeshInstalled);
        MeshState::Installed
      }
      MeshState::Installed => {
        let outcome = service::ensure_running(exec, TAILSCALE_SERVICE).await?;
        report.record_service(TAILSCALE_SERVICE, outcome);
        MeshState::DaemonUp
      }
      MeshState::DaemonUp => match read_status(exec).await {
        Some(status) if status.is_running() => MeshState::Connected,
        _ => MeshState::Disconnected,
      },
      MeshState::Disconnected => {
        // Not re-verified: an interactive login completes out of band.
        connect(exec, auth_key, report).await?;
        MeshState::Connected
      }
      MeshState::Connected => MeshState::IdentityReady(read_identity(exec).await?),
      MeshState::IdentityReady(identity) => {
        info!(identity = %identity, "mesh identity ready");
        return Ok(identity);
      }
    };
  }
}
