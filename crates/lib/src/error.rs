//! Error taxonomy for a bootstrap run.
//!
//! Every variant is fatal: the run aborts where it is raised and steps that
//! already converged stay converged. Advisory conditions are not errors; they
//! are collected as warnings on the run report instead.

use thiserror::Error;

use crate::exec::ExecError;
use crate::materialize::MaterializeError;

#[derive(Debug, Error)]
pub enum BootstrapError {
  /// A required external capability is missing (elevation helper, package
  /// manager, target directory, compose descriptor or plugin).
  #[error("configuration error: {0}")]
  Configuration(String),

  /// The mesh daemon did not yield a usable address and DNS name.
  #[error("mesh identity unavailable: {0}")]
  IdentityUnavailable(String),

  /// The Docker daemon could not be reached, even through sudo.
  #[error("container runtime unreachable: {0}")]
  RuntimeAccess(String),

  /// An external command could not be spawned or exited non-zero.
  #[error(transparent)]
  Exec(#[from] ExecError),

  /// Reading or writing a materialized config file failed.
  #[error(transparent)]
  Materialize(#[from] MaterializeError),
}
