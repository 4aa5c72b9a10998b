//! Presence check for the TLS certificate pair the stack serves.
//!
//! Certificates are issued out of band; this module only reports whether
//! `<certs_dir>/<fqdn>.crt` and `<certs_dir>/<fqdn>.key` exist.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertPair {
  pub cert: PathBuf,
  pub key: PathBuf,
}

impl CertPair {
  pub fn for_fqdn(certs_dir: &Path, fqdn: &str) -> Self {
    Self {
      cert: certs_dir.join(format!("{}.crt", fqdn)),
      key: certs_dir.join(format!("{}.key", fqdn)),
    }
  }

  /// Paths of the pair that are absent or empty.
  pub fn missing(&self) -> Vec<&Path> {
    [self.cert.as_path(), self.key.as_path()]
      .into_iter()
      .filter(|path| !is_usable(path))
      .collect()
  }

  pub fn is_present(&self) -> bool {
    self.missing().is_empty()
  }
}

fn is_usable(path: &Path) -> bool {
  fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const FQDN: &str = "pi.tailnet-1234.ts.net";

  #[test]
  fn paths_follow_fqdn() {
    let pair = CertPair::for_fqdn(Path::new("/srv/homelab/config/certs"), FQDN);

    assert_eq!(pair.cert, PathBuf::from("/srv/homelab/config/certs/pi.tailnet-1234.ts.net.crt"));
    assert_eq!(pair.key, PathBuf::from("/srv/homelab/config/certs/pi.tailnet-1234.ts.net.key"));
  }

  #[test]
  fn both_files_present() {
    let temp = TempDir::new().unwrap();
    let pair = CertPair::for_fqdn(temp.path(), FQDN);
    fs::write(&pair.cert, "cert").unwrap();
    fs::write(&pair.key, "key").unwrap();

    assert!(pair.is_present());
  }

  #[test]
  fn reports_each_missing_file() {
    let temp = TempDir::new().unwrap();
    let pair = CertPair::for_fqdn(temp.path(), FQDN);
    fs::write(&pair.cert, "cert").unwrap();

    assert!(!pair.is_present());
    assert_eq!(pair.missing(), vec![pair.key.as_path()]);
  }

  #[test]
  fn empty_file_counts_as_missing() {
    let temp = TempDir::new().unwrap();
    let pair = CertPair::for_fqdn(temp.path(), FQDN);
    fs::write(&pair.cert, "").unwrap();
    fs::write(&pair.key, "key").unwrap();

    assert_eq!(pair.missing(), vec![pair.cert.as_path()]);
  }

  #[test]
  fn missing_directory_means_nothing_present() {
    let temp = TempDir::new().unwrap();
    let pair = CertPair::for_fqdn(&temp.path().join("nope"), FQDN);

    assert_eq!(pair.missing().len(), 2);
  }
}
