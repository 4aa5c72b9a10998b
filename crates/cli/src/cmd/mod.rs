mod apply;
mod status;

pub use apply::cmd_apply;
pub use status::cmd_status;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

/// Every command runs its steps one after another on a single thread.
fn runtime() -> Result<Runtime> {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")
}
