//! Headless database update command

use std::sync::Arc;

use anyhow::{Context, Result};
use fsearch::{Coordinator, RuntimeConfig, engine::FsEngine};

/// Update the database, either through the primary instance or locally.
///
/// Exits with status 0 on success and 1 on failure.
pub async fn cmd_update_database(runtime: RuntimeConfig) -> Result<()> {
  let outcome = Coordinator::new(runtime, Arc::new(FsEngine::new()))
    .run()
    .await
    .context("Failed to update database")?;

  if let Some(summary) = outcome.summary() {
    if outcome.is_success() {
      println!("{}", summary);
    } else {
      eprintln!("{}", summary);
    }
  }

  std::process::exit(outcome.exit_code());
}
