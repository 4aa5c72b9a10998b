//! External command execution.
//!
//! Every side effect of a bootstrap run is an external command. The
//! [`CommandRunner`] trait is the single seam between the convergence logic
//! and the host: [`SystemRunner`] spawns real processes, while tests drive the
//! same code through a scripted fake host.

mod runner;
mod types;

pub use runner::SystemRunner;
pub use types::{CommandOutput, ExecError, Invocation, Stdio};

/// Runs external commands and answers `PATH` lookups.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
  /// Run `inv` to completion.
  ///
  /// A non-zero exit is reported through [`CommandOutput::code`], not as an
  /// error; only a failure to spawn is an `Err`.
  async fn run(&self, inv: &Invocation) -> Result<CommandOutput, ExecError>;

  /// Whether `name` resolves to an executable on `PATH`.
  fn has_command(&self, name: &str) -> bool;
}

impl<R: CommandRunner> CommandRunner for &R {
  async fn run(&self, inv: &Invocation) -> Result<CommandOutput, ExecError> {
    (**self).run(inv).await
  }

  fn has_command(&self, name: &str) -> bool {
    (**self).has_command(name)
  }
}
