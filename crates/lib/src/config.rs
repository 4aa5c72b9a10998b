//! Run settings resolved from flags, environment and `$HOME`.

use std::fmt;
use std::path::PathBuf;

use crate::certs::CertPair;
use crate::consts::{AUTH_KEY_ENV, CERTS_SUBDIR, DEFAULT_DIR_NAME, ENV_FILE_NAME, HOMELAB_DIR_ENV};
use crate::error::BootstrapError;

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
  /// Deployment directory holding the compose descriptor, `.env` and certs.
  pub homelab_dir: PathBuf,
  /// Tailscale auth key; `None` means interactive login.
  pub auth_key: Option<String>,
  /// Login user added to the docker group.
  pub user: String,
}

impl Settings {
  /// Settings from `HOMELAB_DIR` and `TAILSCALE_AUTH_KEY` alone.
  pub fn from_env() -> Result<Self, BootstrapError> {
    Self::resolve(None, None)
  }

  /// Explicit values win over the environment. Empty values count as unset.
  pub fn resolve(dir: Option<PathBuf>, auth_key: Option<String>) -> Result<Self, BootstrapError> {
    let homelab_dir = match dir.filter(|dir| !dir.as_os_str().is_empty()) {
      Some(dir) => dir,
      None => match non_empty_var(HOMELAB_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => default_dir()?,
      },
    };
    let homelab_dir = dunce::canonicalize(&homelab_dir).unwrap_or(homelab_dir);

    let auth_key = auth_key
      .filter(|key| !key.is_empty())
      .or_else(|| non_empty_var(AUTH_KEY_ENV));

    Ok(Self {
      homelab_dir,
      auth_key,
      user: whoami::username(),
    })
  }

  pub fn env_file(&self) -> PathBuf {
    self.homelab_dir.join(ENV_FILE_NAME)
  }

  pub fn certs_dir(&self) -> PathBuf {
    CERTS_SUBDIR
      .iter()
      .fold(self.homelab_dir.clone(), |path, part| path.join(part))
  }

  pub fn cert_pair(&self, fqdn: &str) -> CertPair {
    CertPair::for_fqdn(&self.certs_dir(), fqdn)
  }
}

impl fmt::Debug for Settings {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Settings")
      .field("homelab_dir", &self.homelab_dir)
      .field("auth_key", &self.auth_key.as_ref().map(|_| "<redacted>"))
      .field("user", &self.user)
      .finish()
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn default_dir() -> Result<PathBuf, BootstrapError> {
  let home = non_empty_var("HOME").ok_or_else(|| {
    BootstrapError::Configuration(format!("neither {} nor HOME is set; pass --dir", HOMELAB_DIR_ENV))
  })?;
  Ok(PathBuf::from(home).join(DEFAULT_DIR_NAME))
}
