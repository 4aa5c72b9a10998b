//! Test utilities for homelab-lib.
//!
//! [`MockHost`] is a [`CommandRunner`] that simulates the slice of a Linux host
//! the bootstrap touches: an apt package database, systemd units, groups,
//! the Docker daemon and the Tailscale daemon. Commands mutate the simulated
//! state the way the real tools would, so a pipeline can be run twice against
//! the same host to check idempotence. Every invocation is recorded.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::consts::{COMPOSE_PLUGIN_PACKAGE, DOCKER_GROUP, DOCKER_SERVICE, TAILSCALE_SERVICE};
use crate::exec::{CommandOutput, CommandRunner, ExecError, Invocation};

/// Enabled/active flags of a simulated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitState {
  pub enabled: bool,
  pub active: bool,
}

/// Simulated Tailscale daemon state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshState {
  pub backend: String,
  pub address: String,
  pub dns_name: Option<String>,
  /// Replaces the generated `tailscale status --json` output when set.
  pub raw_status: Option<String>,
}

/// Everything the fake host knows about itself.
#[derive(Debug, Clone)]
pub struct HostState {
  pub root: bool,
  pub user: String,
  pub commands: BTreeSet<String>,
  pub packages: BTreeSet<String>,
  pub units: BTreeMap<String, UnitState>,
  /// Group name to members.
  pub groups: BTreeMap<String, BTreeSet<String>>,
  /// Whether the current login session can reach the Docker socket.
  pub session_docker_access: bool,
  pub compose_available: bool,
  pub mesh: MeshState,
  /// Command-line substrings that make a matching command exit 1.
  pub failing: Vec<String>,
  /// Install scripts exit 0 without installing anything.
  pub inert_installers: bool,
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
  pub line: String,
  pub mutating: bool,
}

#[derive(Debug)]
pub struct MockHost {
  state: RefCell<HostState>,
  calls: RefCell<Vec<Call>>,
}

pub const MOCK_USER: &str = "pi";
pub const MOCK_ADDRESS: &str = "100.64.0.3";
pub const MOCK_DNS_NAME: &str = "pi.tailnet-1234.ts.net.";

impl MockHost {
  /// A freshly provisioned Debian-like host: sudo, apt and systemd, nothing else.
  pub fn fresh() -> Self {
    let commands = [
      "sudo",
      "apt-get",
      "dpkg-query",
      "systemctl",
      "getent",
      "groupadd",
      "id",
      "usermod",
      "sh",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    Self::from_state(HostState {
      root: false,
      user: MOCK_USER.to_string(),
      commands,
      packages: BTreeSet::new(),
      units: BTreeMap::new(),
      groups: BTreeMap::new(),
      session_docker_access: false,
      compose_available: false,
      mesh: MeshState {
        backend: "NoState".to_string(),
        address: MOCK_ADDRESS.to_string(),
        dns_name: Some(MOCK_DNS_NAME.to_string()),
        raw_status: None,
      },
      failing: Vec::new(),
      inert_installers: false,
    })
  }

  /// A host on which a previous bootstrap run fully converged.
  pub fn converged() -> Self {
    let host = Self::fresh()
      .with_packages(["curl", "ca-certificates", "jq"])
      .with_command("docker")
      .with_command("tailscale")
      .with_service(DOCKER_SERVICE, true, true)
      .with_service(TAILSCALE_SERVICE, true, true)
      .with_group_member(DOCKER_GROUP, MOCK_USER)
      .with_session_docker_access(true)
      .with_backend("Running");
    host.state.borrow_mut().compose_available = true;
    host
  }

  pub fn from_state(state: HostState) -> Self {
    Self {
      state: RefCell::new(state),
      calls: RefCell::new(Vec::new()),
    }
  }

  pub fn as_root(self) -> Self {
    {
      let mut state = self.state.borrow_mut();
      state.root = true;
      state.user = "root".to_string();
    }
    self
  }

  pub fn with_command(self, name: &str) -> Self {
    self.state.borrow_mut().commands.insert(name.to_string());
    self
  }

  pub fn without_command(self, name: &str) -> Self {
    self.state.borrow_mut().commands.remove(name);
    self
  }

  pub fn with_packages<'a>(self, names: impl IntoIterator<Item = &'a str>) -> Self {
    self
      .state
      .borrow_mut()
      .packages
      .extend(names.into_iter().map(str::to_string));
    self
  }

  pub fn with_service(self, name: &str, enabled: bool, active: bool) -> Self {
    self
      .state
      .borrow_mut()
      .units
      .insert(name.to_string(), UnitState { enabled, active });
    self
  }

  pub fn with_group(self, group: &str) -> Self {
    self.state.borrow_mut().groups.entry(group.to_string()).or_default();
    self
  }

  pub fn with_group_member(self, group: &str, user: &str) -> Self {
    self
      .state
      .borrow_mut()
      .groups
      .entry(group.to_string())
      .or_default()
      .insert(user.to_string());
    self
  }

  pub fn with_session_docker_access(self, access: bool) -> Self {
    self.state.borrow_mut().session_docker_access = access;
    self
  }

  pub fn with_compose(self, available: bool) -> Self {
    self.state.borrow_mut().compose_available = available;
    self
  }

  pub fn with_backend(self, backend: &str) -> Self {
    self.state.borrow_mut().mesh.backend = backend.to_string();
    self
  }

  pub fn with_address(self, address: &str) -> Self {
    self.state.borrow_mut().mesh.address = address.to_string();
    self
  }

  pub fn with_dns_name(self, dns_name: Option<&str>) -> Self {
    self.state.borrow_mut().mesh.dns_name = dns_name.map(str::to_string);
    self
  }

  pub fn with_raw_status(self, json: &str) -> Self {
    self.state.borrow_mut().mesh.raw_status = Some(json.to_string());
    self
  }

  /// Make every command whose line contains `pattern` exit 1.
  pub fn failing(self, pattern: &str) -> Self {
    self.state.borrow_mut().failing.push(pattern.to_string());
    self
  }

  pub fn with_inert_installers(self) -> Self {
    self.state.borrow_mut().inert_installers = true;
    self
  }

  pub fn state(&self) -> HostState {
    self.state.borrow().clone()
  }

  pub fn has_package(&self, name: &str) -> bool {
    self.state.borrow().packages.contains(name)
  }

  pub fn unit(&self, name: &str) -> Option<UnitState> {
    self.state.borrow().units.get(name).copied()
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.borrow().iter().map(|call| call.line.clone()).collect()
  }

  pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
    self.calls().into_iter().filter(|line| line.contains(pattern)).collect()
  }

  pub fn count_calls(&self, pattern: &str) -> usize {
    self.calls_matching(pattern).len()
  }

  /// Recorded commands that changed host state.
  pub fn mutating_calls(&self) -> Vec<String> {
    self
      .calls
      .borrow()
      .iter()
      .filter(|call| call.mutating)
      .map(|call| call.line.clone())
      .collect()
  }

  pub fn clear_calls(&self) {
    self.calls.borrow_mut().clear();
  }

  fn record(&self, line: &str, mutating: bool) {
    self.calls.borrow_mut().push(Call {
      line: line.to_string(),
      mutating,
    });
  }

  fn simulate(&self, args: &[&str], elevated: bool) -> (CommandOutput, bool) {
    let mut state = self.state.borrow_mut();
    let privileged = elevated || state.root;
    let denied = || (CommandOutput::failed(1, "permission denied"), false);

    match args {
      ["dpkg-query", "-W", "-f=${Status}", name] => {
        let output = if state.packages.contains(*name) {
          CommandOutput::ok("install ok installed")
        } else {
          CommandOutput::failed(1, format!("dpkg-query: no packages found matching {}", name))
        };
        (output, false)
      }
      ["apt-get", "update"] => {
        if !privileged {
          return denied();
        }
        (CommandOutput::ok(""), true)
      }
      ["apt-get", "install", "-y", names @ ..] => {
        if !privileged {
          return denied();
        }
        for name in names {
          state.packages.insert(name.to_string());
          if *name == COMPOSE_PLUGIN_PACKAGE {
            state.compose_available = true;
          }
        }
        (CommandOutput::ok(""), true)
      }
      ["systemctl", "is-enabled", "--quiet", name] => {
        let enabled = state.units.get(*name).is_some_and(|unit| unit.enabled);
        (exit_status(enabled), false)
      }
      ["systemctl", "is-active", "--quiet", name] => {
        let active = state.units.get(*name).is_some_and(|unit| unit.active);
        (exit_status(active), false)
      }
      ["systemctl", verb @ ("enable" | "start"), name] => {
        if !privileged {
          return denied();
        }
        let Some(unit) = state.units.get_mut(*name) else {
          return (CommandOutput::failed(5, format!("Unit {}.service not found.", name)), false);
        };
        if *verb == "enable" {
          unit.enabled = true;
        } else {
          unit.active = true;
        }
        (CommandOutput::ok(""), true)
      }
      ["getent", "group", group] => match state.groups.get(*group) {
        Some(members) => {
          let members: Vec<_> = members.iter().cloned().collect();
          (CommandOutput::ok(format!("{}:x:999:{}\n", group, members.join(","))), false)
        }
        None => (CommandOutput::failed(2, ""), false),
      },
      ["groupadd", group] => {
        if !privileged {
          return denied();
        }
        state.groups.entry(group.to_string()).or_default();
        (CommandOutput::ok(""), true)
      }
      ["id", "-nG", user] => {
        let mut names = vec![user.to_string()];
        names.extend(
          state
            .groups
            .iter()
            .filter(|(_, members)| members.contains(*user))
            .map(|(group, _)| group.clone()),
        );
        (CommandOutput::ok(format!("{}\n", names.join(" "))), false)
      }
      ["usermod", "-aG", group, user] => {
        if !privileged {
          return denied();
        }
        let Some(members) = state.groups.get_mut(*group) else {
          return (CommandOutput::failed(6, format!("usermod: group '{}' does not exist", group)), false);
        };
        members.insert(user.to_string());
        (CommandOutput::ok(""), true)
      }
      ["sh", "-c", script] => {
        if !privileged {
          return denied();
        }
        if state.inert_installers {
          return (CommandOutput::ok(""), false);
        }
        if script.contains("get.docker.com") {
          state.commands.insert("docker".to_string());
          state.units.insert(DOCKER_SERVICE.to_string(), UnitState::default());
          state.groups.entry(DOCKER_GROUP.to_string()).or_default();
          state.compose_available = true;
        } else if script.contains("tailscale.com/install.sh") {
          state.commands.insert("tailscale".to_string());
          state.units.insert(TAILSCALE_SERVICE.to_string(), UnitState::default());
        }
        (CommandOutput::ok(""), true)
      }
      ["docker", "info"] => {
        let daemon_up = state.units.get(DOCKER_SERVICE).is_some_and(|unit| unit.active);
        let reachable = daemon_up && (privileged || state.session_docker_access);
        let output = if reachable {
          CommandOutput::ok("Server Version: 27.0.0")
        } else {
          CommandOutput::failed(1, "permission denied while trying to connect to the Docker daemon socket")
        };
        (output, false)
      }
      ["docker", "compose", "version"] => (exit_status(state.compose_available), false),
      ["docker", "compose", "-f", _, "pull"] | ["docker", "compose", "-f", _, "up", "-d", "--remove-orphans"] => {
        let daemon_up = state.units.get(DOCKER_SERVICE).is_some_and(|unit| unit.active);
        (exit_status(daemon_up && (privileged || state.session_docker_access)), false)
      }
      ["tailscale", "status", "--json"] => {
        let daemon_up = state.units.get(TAILSCALE_SERVICE).is_some_and(|unit| unit.active);
        if !daemon_up {
          return (CommandOutput::failed(1, "failed to connect to local tailscaled"), false);
        }
        let json = state.mesh.raw_status.clone().unwrap_or_else(|| {
          let mut node = serde_json::Map::new();
          if let Some(dns_name) = &state.mesh.dns_name {
            node.insert("DNSName".into(), dns_name.clone().into());
          }
          serde_json::json!({ "BackendState": state.mesh.backend, "Self": node }).to_string()
        });
        (CommandOutput::ok(json), false)
      }
      ["tailscale", "up", ..] => {
        if !privileged {
          return denied();
        }
        state.mesh.backend = "Running".to_string();
        (CommandOutput::ok(""), true)
      }
      ["tailscale", "ip", "-4"] => {
        if state.mesh.backend != "Running" {
          return (CommandOutput::failed(1, "no current Tailscale IPs; state: Stopped"), false);
        }
        (CommandOutput::ok(format!("{}\n", state.mesh.address)), false)
      }
      _ => (CommandOutput::failed(127, format!("mock: unhandled command {:?}", args)), false),
    }
  }
}

fn exit_status(success: bool) -> CommandOutput {
  if success {
    CommandOutput::ok("")
  } else {
    CommandOutput::failed(1, "")
  }
}

impl CommandRunner for MockHost {
  async fn run(&self, inv: &Invocation) -> Result<CommandOutput, ExecError> {
    let argv = inv.argv();
    let line = argv.join(" ");

    let mut rest: &[&str] = &argv;
    let mut elevated = false;
    if rest.first() == Some(&"sudo") {
      elevated = true;
      rest = &rest[1..];
      if rest.first() == Some(&"env") {
        rest = &rest[1..];
        while rest.first().is_some_and(|arg| arg.contains('=')) {
          rest = &rest[1..];
        }
      }
    }

    let program = argv[0];
    let known = self.has_command(program) && rest.first().is_some_and(|name| self.has_command(name));
    if !known {
      self.record(&line, false);
      return Err(ExecError::Spawn {
        cmd: inv.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
      });
    }

    if self.state.borrow().failing.iter().any(|pattern| line.contains(pattern)) {
      self.record(&line, false);
      return Ok(CommandOutput::failed(1, "simulated failure"));
    }

    let (output, mutating) = self.simulate(rest, elevated);
    self.record(&line, mutating);
    Ok(output)
  }

  fn has_command(&self, name: &str) -> bool {
    self.state.borrow().commands.contains(name)
  }
}
