//! Primary instance command

use anyhow::{Context, Result};
use fsearch::{RuntimeConfig, config::Config, run_primary};
use tracing::info;

use crate::logging::init_primary_logging;

/// Run the primary instance until ctrl-c
pub async fn cmd_run(runtime: RuntimeConfig) -> Result<()> {
  // Logging comes up before the application, so read the log settings here
  let log_config = Config::load_or_default(runtime.config_path.as_deref())
    .map(|config| config.log)
    .unwrap_or_default();
  let _guard = init_primary_logging(runtime.foreground, &log_config);

  info!("Starting fsearch");
  run_primary(runtime).await.context("Failed to run fsearch")?;

  Ok(())
}
