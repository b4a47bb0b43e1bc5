mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{LockCommand, StoreCommand, TtlCommand};
use output::OutputFormat;

/// dps - distributed process store
#[derive(Parser)]
#[command(name = "dps")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to a config file (default: $DPS_CONFIG, then the user config dir)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, value_enum, default_value_t, global = true)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show substrate, config and machine details
  Info,

  /// Work with named stores
  Store {
    #[command(subcommand)]
    command: StoreCommand,
  },

  /// Work with the TTL area
  Ttl {
    #[command(subcommand)]
    command: TtlCommand,
  },

  /// Work with named locks
  Lock {
    #[command(subcommand)]
    command: LockCommand,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = cli.config.as_deref();
  match cli.command {
    Commands::Info => cmd::cmd_info(config, cli.output),
    Commands::Store { command } => cmd::cmd_store(config, command, cli.output),
    Commands::Ttl { command } => cmd::cmd_ttl(config, command, cli.output),
    Commands::Lock { command } => cmd::cmd_lock(config, command, cli.output),
  }
}
