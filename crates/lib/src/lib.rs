//! homelab-lib: idempotent host bootstrap for a single-node homelab
//!
//! This crate converges a machine into a state where a compose-based stack
//! can run on the tailnet:
//! - `packages` / `service`: system packages and systemd units
//! - `docker`: runtime install, group membership and access probing
//! - `mesh`: Tailscale install, login and identity acquisition
//! - `materialize`: change-minimizing writes of the stack's `.env`
//! - `stack`: `docker compose` pull and up
//!
//! Every command goes through one [`privilege::Executor`] built per run;
//! [`pipeline::bootstrap`] drives the steps in order.

pub mod certs;
pub mod config;
pub mod consts;
pub mod docker;
pub mod error;
pub mod exec;
pub mod materialize;
pub mod mesh;
pub mod packages;
pub mod pipeline;
pub mod privilege;
pub mod report;
pub mod service;
pub mod stack;
pub mod status;
pub mod util;

pub use config::Settings;
pub use error::BootstrapError;
pub use pipeline::{BootstrapOptions, bootstrap};
pub use report::{BootstrapReport, Change};
