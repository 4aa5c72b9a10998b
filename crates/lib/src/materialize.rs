//! Change-minimizing config file writes.
//!
//! Desired content is rendered deterministically and compared byte-for-byte
//! with what is on disk. Only a difference causes a write, and that write goes
//! through a temp file in the same directory followed by a rename, so readers
//! never see a partial file and an unchanged file keeps its mtime.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{TS_FQDN_KEY, TS_IP_KEY};
use crate::mesh::MeshIdentity;

/// Whether [`write_if_changed`] touched the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
  Changed,
  Unchanged,
}

/// Errors from reading or replacing a materialized file.
#[derive(Debug, Error)]
pub enum MaterializeError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{0} has no parent directory")]
  NoParent(PathBuf),
}

/// Ordered `KEY=value` pairs rendered as a dotenv file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
  entries: Vec<(String, String)>,
}

impl EnvConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// The identity variables consumed by the deployment stack.
  pub fn from_identity(identity: &MeshIdentity) -> Self {
    let mut config = Self::new();
    config.set(TS_IP_KEY, identity.address.to_string());
    config.set(TS_FQDN_KEY, identity.fqdn.clone());
    config
  }

  /// Set `key`, keeping its original position when it already exists.
  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let value = value.into();
    match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
      Some(entry) => entry.1 = value,
      None => self.entries.push((key, value)),
    }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .entries
      .iter()
      .find(|(existing, _)| existing == key)
      .map(|(_, value)| value.as_str())
  }

  pub fn render(&self) -> String {
    self
      .entries
      .iter()
      .map(|(key, value)| format!("{}={}\n", key, value))
      .collect()
  }
}

/// Write `content` to `path` unless the file already holds exactly that.
pub fn write_if_changed(path: &Path, content: &str) -> Result<WriteOutcome, MaterializeError> {
  match fs::read(path) {
    Ok(existing) if existing == content.as_bytes() => {
      debug!(path = %path.display(), "content unchanged; skipping write");
      return Ok(WriteOutcome::Unchanged);
    }
    Ok(_) => {}
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(source) => {
      return Err(MaterializeError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  }

  let dir = path
    .parent()
    .filter(|dir| !dir.as_os_str().is_empty())
    .ok_or_else(|| MaterializeError::NoParent(path.to_path_buf()))?;
  let write_err = |source| MaterializeError::Write {
    path: path.to_path_buf(),
    source,
  };

  let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
  temp.write_all(content.as_bytes()).map_err(write_err)?;
  set_readable(temp.as_file()).map_err(write_err)?;
  temp.as_file().sync_all().map_err(write_err)?;
  temp.persist(path).map_err(|e| write_err(e.error))?;

  info!(path = %path.display(), bytes = content.len(), "wrote file");
  Ok(WriteOutcome::Changed)
}

/// Temp files are created 0600; the stack reading `.env` may run as another user.
#[cfg(unix)]
fn set_readable(file: &fs::File) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_readable(_file: &fs::File) -> io::Result<()> {
  Ok(())
}
