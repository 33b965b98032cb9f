//! Commands that talk to the running primary instance

use anyhow::{Context, Result, bail};
use fsearch::{
  Action, RuntimeConfig,
  bus::{self, ActivateParams, BusClient, BusRequest, BusResponse},
};

async fn connect_primary(runtime: &RuntimeConfig) -> Result<BusClient> {
  BusClient::connect_name(&runtime.bus, bus::PRIMARY_NAME)
    .await
    .context("fsearch is not running")
}

/// Cancel the database update running in the primary instance
pub async fn cmd_cancel_update(runtime: RuntimeConfig) -> Result<()> {
  let mut client = connect_primary(&runtime).await?;

  let cancel = Action::CancelUpdateDatabase.name();
  let enabled = match client.call(BusRequest::DescribeActions).await? {
    BusResponse::Actions(actions) => actions.iter().any(|a| a.name == cancel && a.enabled),
    other => bail!("Unexpected response: {:?}", other),
  };
  if !enabled {
    println!("No database update in progress");
    return Ok(());
  }

  client
    .call(BusRequest::Activate(ActivateParams {
      action: cancel.to_string(),
    }))
    .await?;
  println!("Cancellation requested");

  Ok(())
}

/// Print the primary instance's database status
pub async fn cmd_status(runtime: RuntimeConfig) -> Result<()> {
  let mut client = connect_primary(&runtime).await?;

  match client.call(BusRequest::Status).await? {
    BusResponse::Status(status) => {
      println!("State:          {}", status.db_state.as_str());
      println!("Entries:        {}", status.num_entries);
      println!("Active updates: {}", status.active_updates);
    }
    other => bail!("Unexpected response: {:?}", other),
  }

  Ok(())
}
