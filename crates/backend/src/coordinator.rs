//! Headless database update (`fsearch --update-database`).
//!
//! Several invocations may start at once (login scripts, cron, a user at a
//! terminal). They elect one leader by binding the worker bus name:
//!
//! ```text
//! acquire(fsearch-db-worker)
//!   ├── owned ── primary exports update_database? ── yes ─> activate, Delegated
//!   │                                             └─ no ──> scan + save, Local
//!   │            (name held until done, waiters get await_completion answer)
//!   └── taken ── await_completion ── answered ─> Deferred
//!                                 └─ owner gone ─> elect again
//! ```

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  actor::message::Action,
  application::RuntimeConfig,
  bus::{
    self, ActivateParams, BusClient, BusError, BusHandler, BusRequest, BusResponse, BusServer, CompletionInfo, codes,
    name::{Acquisition, NameOwner},
  },
  cancel::UpdateCancellation,
  domain::config::{Config, ConfigError},
  engine::IndexEngine,
};

/// Elections attempted before giving up on a vanished leader
const MAX_ELECTIONS: usize = 3;

const DEFAULT_DESCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the leader keeps answering `await_completion` after it is done
const COMPLETION_LINGER: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
  #[error(transparent)]
  Bus(#[from] BusError),
  #[error("Failed to load config: {0}")]
  Config(#[from] ConfigError),
  #[error("Local scan failed to run: {0}")]
  Worker(String),
}

/// Result of a local scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalScanReport {
  /// Scan and save both succeeded
  pub success: bool,
  pub elapsed: Duration,
  pub num_entries: usize,
}

/// How a headless update ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessOutcome {
  /// The running primary instance took over the update
  Delegated,
  /// Another headless invocation did the work. `success` is that
  /// invocation's result; this one exits 0 either way.
  Deferred { success: bool },
  Local(LocalScanReport),
}

impl HeadlessOutcome {
  pub fn is_success(&self) -> bool {
    match self {
      HeadlessOutcome::Delegated => true,
      HeadlessOutcome::Deferred { success } => *success,
      HeadlessOutcome::Local(report) => report.success,
    }
  }

  pub fn exit_code(&self) -> i32 {
    match self {
      HeadlessOutcome::Deferred { .. } => 0,
      other if other.is_success() => 0,
      _ => 1,
    }
  }

  /// Line printed for a local scan; `None` when nothing was scanned here.
  pub fn summary(&self) -> Option<String> {
    match self {
      HeadlessOutcome::Local(report) if report.success => Some(format!(
        "[fsearch] database update finished successfully in {:.2} seconds",
        report.elapsed.as_secs_f64()
      )),
      HeadlessOutcome::Local(_) => Some("[fsearch] database update failed".to_string()),
      _ => None,
    }
  }
}

pub struct Coordinator {
  runtime: RuntimeConfig,
  engine: Arc<dyn IndexEngine>,
  describe_timeout: Duration,
}

impl Coordinator {
  pub fn new(runtime: RuntimeConfig, engine: Arc<dyn IndexEngine>) -> Self {
    Self {
      runtime,
      engine,
      describe_timeout: DEFAULT_DESCRIBE_TIMEOUT,
    }
  }

  /// Upper bound on waiting for the primary to describe its actions.
  pub fn with_describe_timeout(mut self, timeout: Duration) -> Self {
    self.describe_timeout = timeout;
    self
  }

  pub async fn run(&self) -> Result<HeadlessOutcome, CoordinatorError> {
    for attempt in 0..MAX_ELECTIONS {
      match bus::name::acquire(&self.runtime.bus, bus::WORKER_NAME).await? {
        Acquisition::Owned(owner) => return self.run_as_leader(owner).await,
        Acquisition::Taken => match self.wait_for_leader().await {
          Some(success) => {
            if !success {
              warn!("Database update by another instance failed");
            }
            return Ok(HeadlessOutcome::Deferred { success });
          }
          None => debug!(attempt, "Update leader went away, electing again"),
        },
      }
    }

    warn!("No stable update leader, scanning locally");
    Ok(HeadlessOutcome::Local(self.scan_locally().await?))
  }

  async fn run_as_leader(&self, owner: NameOwner) -> Result<HeadlessOutcome, CoordinatorError> {
    debug!("Elected update leader");
    let (done_tx, done_rx) = watch::channel(None);
    let cancel = CancellationToken::new();
    let server = BusServer::new(owner, Arc::new(CompletionHandler { done: done_rx })).with_linger(COMPLETION_LINGER);
    let server_handle = tokio::spawn(server.run(cancel.clone()));

    let result = if self.delegate_to_primary().await {
      Ok(HeadlessOutcome::Delegated)
    } else {
      self.scan_locally().await.map(HeadlessOutcome::Local)
    };

    let success = result.as_ref().is_ok_and(HeadlessOutcome::is_success);
    let _ = done_tx.send(Some(success));

    cancel.cancel();
    match server_handle.await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => warn!("Worker bus server error: {}", e),
      Err(e) => warn!("Worker bus server task failed: {}", e),
    }
    result
  }

  /// Ask a running primary instance to do the update.
  async fn delegate_to_primary(&self) -> bool {
    let mut client = match BusClient::connect_name(&self.runtime.bus, bus::PRIMARY_NAME).await {
      Ok(client) => client,
      Err(e) => {
        debug!(error = %e, "No primary instance");
        return false;
      }
    };

    let update = Action::UpdateDatabase.name();
    match client.call_timeout(BusRequest::DescribeActions, self.describe_timeout).await {
      Ok(BusResponse::Actions(actions)) if actions.iter().any(|a| a.name == update) => {}
      Ok(_) => {
        debug!("Primary instance does not export {}", update);
        return false;
      }
      Err(e) => {
        debug!(error = %e, "Primary instance did not describe its actions");
        return false;
      }
    }

    let request = BusRequest::Activate(ActivateParams {
      action: update.to_string(),
    });
    match client.call_timeout(request, self.describe_timeout).await {
      Ok(BusResponse::Activated) => {
        info!("Triggered database update in primary instance");
        true
      }
      Ok(other) => {
        warn!(response = ?other, "Unexpected response to activate");
        false
      }
      Err(e) => {
        warn!(error = %e, "Primary instance refused the update");
        false
      }
    }
  }

  /// Wait for the current leader. `None` when it disappeared without answering.
  async fn wait_for_leader(&self) -> Option<bool> {
    let mut client = match BusClient::connect_name(&self.runtime.bus, bus::WORKER_NAME).await {
      Ok(client) => client,
      Err(e) => {
        debug!(error = %e, "Update leader unreachable");
        return None;
      }
    };

    info!("Another instance is updating the database, waiting");
    match client.call(BusRequest::AwaitCompletion).await {
      Ok(BusResponse::Completed(info)) => Some(info.success),
      Ok(other) => {
        warn!(response = ?other, "Unexpected response to await_completion");
        None
      }
      Err(e) => {
        debug!(error = %e, "Update leader went away");
        None
      }
    }
  }

  /// Build and save a database in this process.
  async fn scan_locally(&self) -> Result<LocalScanReport, CoordinatorError> {
    let path = self.runtime.config_file();
    let config = match Config::load_from(&path) {
      Ok(config) => config,
      Err(ConfigError::NotFound(_)) => Config::load_default()?,
      Err(e) => {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::load_default()?
      }
    };

    let engine = Arc::clone(&self.engine);
    let data_dir = self.runtime.data_dir.clone();
    tokio::task::spawn_blocking(move || {
      let start = Instant::now();
      let mut db = engine.new_snapshot(&config.index_spec());
      let result = engine
        .scan(&mut db, &UpdateCancellation::new(), None)
        .and_then(|()| engine.save(&db, &data_dir));
      if let Err(e) = &result {
        warn!(error = %e, "Local database update failed");
      }

      LocalScanReport {
        success: result.is_ok(),
        elapsed: start.elapsed(),
        num_entries: db.num_entries(),
      }
    })
    .await
    .map_err(|e| CoordinatorError::Worker(e.to_string()))
  }
}

/// Serves `await_completion` for instances that lost the election.
struct CompletionHandler {
  done: watch::Receiver<Option<bool>>,
}

#[async_trait]
impl BusHandler for CompletionHandler {
  async fn handle(&self, request: BusRequest) -> Result<BusResponse, BusError> {
    match request {
      BusRequest::AwaitCompletion => {
        let mut done = self.done.clone();
        let success = done
          .wait_for(Option::is_some)
          .await
          .map(|v| v.unwrap_or(false))
          .map_err(|_| BusError::Shutdown)?;
        Ok(BusResponse::Completed(CompletionInfo { success }))
      }
      BusRequest::DescribeActions => Ok(BusResponse::Actions(Vec::new())),
      other => Err(BusError::rpc(
        codes::UNKNOWN_ACTION,
        format!("{:?} is not served by the update worker", other),
      )),
    }
  }
}
