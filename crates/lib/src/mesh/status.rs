//! Typed view of `tailscale status --json`.
//!
//! Only the fields the bootstrap reads are modelled. Every field is optional:
//! an absent field is `None`, an empty one is `Some("")`, and the two stay
//! distinguishable until [`super::MeshIdentity::from_parts`] validates them.

use serde::Deserialize;

/// `BackendState` value of a connected daemon.
pub const BACKEND_RUNNING: &str = "Running";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MeshStatus {
  #[serde(rename = "BackendState", default)]
  pub backend_state: Option<String>,

  #[serde(rename = "Self", default)]
  pub self_node: Option<SelfNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SelfNode {
  #[serde(rename = "DNSName", default)]
  pub dns_name: Option<String>,
}

impl MeshStatus {
  pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }

  pub fn is_running(&self) -> bool {
    self.backend_state.as_deref() == Some(BACKEND_RUNNING)
  }

  /// `Self.DNSName` as reported, trailing dot included.
  pub fn dns_name(&self) -> Option<&str> {
    self.self_node.as_ref()?.dns_name.as_deref()
  }
}
