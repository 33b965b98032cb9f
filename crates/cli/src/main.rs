//! fsearch - file search database with background updates

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use fsearch::RuntimeConfig;

mod commands;
mod logging;

use commands::{cmd_cancel_update, cmd_run, cmd_status, cmd_update_database};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "fsearch")]
#[command(about = "Keep a searchable database of your files up to date")]
#[command(after_help = "\
EXAMPLES:
  fsearch                         # Run the primary instance
  fsearch --update-database       # Update the database and exit
  fsearch --cancel-update         # Cancel the running update
  fsearch --status                # Show database status")]
struct Cli {
  /// Update the database and exit (hands off to a running instance if any)
  #[arg(short = 'u', long)]
  update_database: bool,

  /// Cancel the database update running in the primary instance
  #[arg(long, conflicts_with = "update_database")]
  cancel_update: bool,

  /// Show the primary instance's database status
  #[arg(long, conflicts_with_all = ["update_database", "cancel_update"])]
  status: bool,

  /// Log to the console instead of the log file
  #[arg(long)]
  foreground: bool,

  /// Config file to use instead of the user config
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let mut runtime = RuntimeConfig::load();
  runtime.foreground = cli.foreground;
  runtime.config_path = cli.config;

  if cli.update_database {
    init_cli_logging();
    cmd_update_database(runtime).await
  } else if cli.cancel_update {
    init_cli_logging();
    cmd_cancel_update(runtime).await
  } else if cli.status {
    init_cli_logging();
    cmd_status(runtime).await
  } else {
    cmd_run(runtime).await
  }
}
