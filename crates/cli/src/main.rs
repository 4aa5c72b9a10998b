mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use homelab_lib::consts::{AUTH_KEY_ENV, HOMELAB_DIR_ENV};

use crate::output::OutputFormat;

/// homelab - Bootstrap a host with Docker, Tailscale and its compose stack
#[derive(Parser)]
#[command(name = "homelab")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, action = ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Converge this host, write the stack's .env and launch the stack
  Apply {
    /// Deployment directory (default: $HOME/homelab)
    #[arg(long, env = HOMELAB_DIR_ENV)]
    dir: Option<PathBuf>,

    /// Tailscale auth key; without one, login is interactive
    #[arg(long, env = AUTH_KEY_ENV, hide_env_values = true)]
    auth_key: Option<String>,

    /// Stop after writing .env and checking certificates
    #[arg(long)]
    skip_launch: bool,
  },

  /// Show what is installed, connected and written, without changing anything
  Status {
    /// Deployment directory (default: $HOME/homelab)
    #[arg(long, env = HOMELAB_DIR_ENV)]
    dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Apply {
      dir,
      auth_key,
      skip_launch,
    } => cmd::cmd_apply(dir, auth_key, skip_launch),
    Commands::Status { dir, output } => cmd::cmd_status(dir, output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      output::print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

/// Logs go to stderr; `RUST_LOG` overrides the verbosity flag.
fn init_tracing(verbose: u8) {
  let level = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();
}
