//! Application lifecycle and the main context.
//!
//! The `Application` is the single owner of the main queue. The worker
//! thread, the auto-update timer and bus connections only post
//! [`MainMessage`]s; everything observers see is delivered from here, in the
//! order it was posted.
//!
//! # Lifecycle
//!
//! 1. `Application::new` spawns the update worker
//! 2. `activate` arms the timer and queues the initial load (plus a scan when
//!    `update_database_on_launch` is set)
//! 3. `run` drains the main queue until cancelled
//! 4. `shutdown` stops the timer, cancels the running update and joins the
//!    worker

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  actor::{
    AutoUpdateTimer, SchedulerError, UpdateScheduler,
    handle::MainHandle,
    message::{Action, AppEvent, FinishedUpdate, MainMessage, OutcomeKind, UpdateAction},
  },
  bus::{
    self, ActionDescription, BusConfig, BusError, BusHandler, BusRequest, BusResponse, BusServer, StatusInfo, codes,
    name::Acquisition,
  },
  dirs,
  domain::{
    config::{Config, ConfigDiff, ConfigError},
    database::Snapshot,
  },
  engine::{FsEngine, IndexEngine},
  state::AppState,
};

// ============================================================================
// Configuration
// ============================================================================

/// Process-level settings that are not part of the user config file.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Directory holding the saved database and logs
  pub data_dir: PathBuf,
  /// Explicit config file; `None` means the user config path
  pub config_path: Option<PathBuf>,
  pub bus: BusConfig,
  /// Log to the console instead of a file
  pub foreground: bool,
}

impl RuntimeConfig {
  pub fn load() -> Self {
    Self {
      data_dir: dirs::default_data_dir(),
      config_path: None,
      bus: BusConfig::default(),
      foreground: false,
    }
  }

  pub fn config_file(&self) -> PathBuf {
    self.config_path.clone().unwrap_or_else(Config::user_config_path)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
  #[error(transparent)]
  Scheduler(#[from] SchedulerError),
  #[error(transparent)]
  Bus(#[from] BusError),
  #[error(transparent)]
  Config(#[from] ConfigError),
}

pub type Observer = Box<dyn FnMut(&AppEvent) + Send>;

// ============================================================================
// Application
// ============================================================================

pub struct Application {
  state: Arc<AppState>,
  scheduler: UpdateScheduler,
  timer: AutoUpdateTimer,
  main: MainHandle,
  queue: mpsc::UnboundedReceiver<MainMessage>,
  observers: Vec<Observer>,
  runtime: RuntimeConfig,
  /// Parent of every timer task
  cancel: CancellationToken,
}

impl Application {
  pub fn new(runtime: RuntimeConfig, config: Config, engine: Arc<dyn IndexEngine>) -> Result<Self, ApplicationError> {
    let state = Arc::new(AppState::new(config));
    let (main, queue) = MainHandle::channel();
    let scheduler = UpdateScheduler::new(engine, state.clone(), main.clone(), runtime.data_dir.clone())?;
    let cancel = CancellationToken::new();
    let timer = AutoUpdateTimer::new(main.clone(), cancel.child_token());

    Ok(Self {
      state,
      scheduler,
      timer,
      main,
      queue,
      observers: Vec::new(),
      runtime,
      cancel,
    })
  }

  pub fn state(&self) -> &Arc<AppState> {
    &self.state
  }

  /// Handle for posting to this application's main context.
  pub fn handle(&self) -> MainHandle {
    self.main.clone()
  }

  pub fn subscribe(&mut self, observer: impl FnMut(&AppEvent) + Send + 'static) {
    self.observers.push(Box::new(observer));
  }

  /// Bus handler that serves the primary name for this application.
  pub fn primary_handler(&self) -> PrimaryHandler {
    PrimaryHandler {
      state: self.state.clone(),
      main: self.main.clone(),
    }
  }

  /// Start up: arm the timer and queue the initial load.
  pub fn activate(&mut self) -> Result<(), ApplicationError> {
    let config = self.state.config();
    self.timer.rearm(&config);
    self.state.cancellation().reset();

    self.scheduler.submit(UpdateAction::Load)?;
    if config.database.update_database_on_launch {
      self.scheduler.submit(UpdateAction::Scan)?;
    }
    Ok(())
  }

  /// Trigger a named action. Returns `false` when the action is disabled.
  pub fn activate_action(&mut self, action: Action) -> bool {
    let actions = self.state.actions();
    match action {
      Action::UpdateDatabase if actions.update_enabled => match self.update_database() {
        Ok(_) => true,
        Err(e) => {
          warn!(error = %e, "Failed to queue database update");
          false
        }
      },
      Action::CancelUpdateDatabase if actions.cancel_enabled => self.cancel_update(),
      _ => {
        debug!(%action, "Ignoring disabled action");
        false
      }
    }
  }

  /// Queue a rescan. Returns the request id.
  pub fn update_database(&self) -> Result<u64, ApplicationError> {
    Ok(self.scheduler.submit(UpdateAction::Scan)?)
  }

  pub fn cancel_update(&self) -> bool {
    self.scheduler.cancel()
  }

  /// Install a new configuration.
  ///
  /// The config is persisted, the timer re-armed, and a rescan queued when
  /// the index settings changed.
  pub fn apply_config(&mut self, config: Config) -> Result<ConfigDiff, ApplicationError> {
    let old = self.state.config();
    let diff = old.compare(&config);

    let path = self.runtime.config_file();
    if let Err(e) = config.save_to(&path) {
      warn!(path = %path.display(), error = %e, "Failed to persist config");
    }

    self.state.set_config(config);
    let new = self.state.config();
    self.timer.rearm(&new);

    if diff.database_config_changed {
      info!("Index settings changed, rescanning");
      self.scheduler.submit(UpdateAction::Scan)?;
    }
    Ok(diff)
  }

  /// The installed database, if any.
  pub fn snapshot(&self) -> Option<Snapshot> {
    self.state.database()
  }

  // ==========================================================================
  // Main loop
  // ==========================================================================

  pub fn dispatch(&mut self, msg: MainMessage) {
    match msg {
      MainMessage::Event(event) => self.notify(&event),
      MainMessage::Finished(update) => self.on_finished(update),
      MainMessage::Submit(action) => {
        if let Err(e) = self.scheduler.submit(action) {
          debug!(?action, error = %e, "Dropping update request");
        }
      }
      MainMessage::Activate(action) => {
        self.activate_action(action);
      }
    }
  }

  /// Wait for and dispatch one message.
  pub async fn dispatch_next(&mut self) {
    if let Some(msg) = self.queue.recv().await {
      self.dispatch(msg);
    }
  }

  /// Dispatch everything already queued. Returns the number of messages.
  pub fn process_pending(&mut self) -> usize {
    let mut count = 0;
    while let Ok(msg) = self.queue.try_recv() {
      self.dispatch(msg);
      count += 1;
    }
    count
  }

  /// Dispatch until no update is active and the queue is empty.
  pub async fn run_until_idle(&mut self) {
    loop {
      self.process_pending();
      if self.state.num_active_updates() == 0 && self.queue.is_empty() {
        return;
      }
      self.dispatch_next().await;
    }
  }

  /// Dispatch until `cancel` fires.
  pub async fn run(&mut self, cancel: CancellationToken) {
    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        Some(msg) = self.queue.recv() => self.dispatch(msg),
      }
    }
  }

  /// Stop the timer, cancel the running update and join the worker.
  ///
  /// Messages still queued are discarded without notifying observers.
  pub async fn shutdown(&mut self) {
    info!("Shutting down database updates");
    self.timer.stop();
    self.cancel.cancel();
    self.scheduler.shutdown().await;

    while let Ok(msg) = self.queue.try_recv() {
      if let MainMessage::Finished(update) = msg {
        self.state.finish_update(update.outcome);
      }
    }
  }

  fn on_finished(&mut self, update: FinishedUpdate) {
    let FinishedUpdate {
      id,
      action,
      outcome,
      elapsed,
    } = update;
    let kind = outcome.kind();
    let report = self.state.finish_update(outcome);

    match kind {
      OutcomeKind::Completed => info!(
        id,
        ?action,
        elapsed_ms = elapsed.as_millis() as u64,
        entries = self.state.num_db_entries(),
        "Database update finished"
      ),
      OutcomeKind::Cancelled => info!(id, ?action, "Database update cancelled"),
      OutcomeKind::Failed => warn!(id, ?action, "Database update failed"),
    }

    if report.installed {
      let num_entries = self.state.num_db_entries();
      self.notify(&AppEvent::DatabaseReplaced { num_entries });
    }
    if let Some(actions) = report.actions {
      self.notify(&AppEvent::ActionsChanged(actions));
    }
    self.notify(&AppEvent::UpdateFinished { action, outcome: kind });
  }

  fn notify(&mut self, event: &AppEvent) {
    for observer in &mut self.observers {
      observer(event);
    }
  }
}

// ============================================================================
// Primary bus handler
// ============================================================================

/// Serves `describe_actions`, `activate` and `status` for the primary name.
pub struct PrimaryHandler {
  state: Arc<AppState>,
  main: MainHandle,
}

#[async_trait]
impl BusHandler for PrimaryHandler {
  async fn handle(&self, request: BusRequest) -> Result<BusResponse, BusError> {
    match request {
      BusRequest::DescribeActions => {
        let actions = self.state.actions();
        Ok(BusResponse::Actions(vec![
          ActionDescription {
            name: Action::UpdateDatabase.name().to_string(),
            enabled: actions.update_enabled,
          },
          ActionDescription {
            name: Action::CancelUpdateDatabase.name().to_string(),
            enabled: actions.cancel_enabled,
          },
        ]))
      }
      BusRequest::Activate(params) => {
        let action = Action::from_name(&params.action)
          .ok_or_else(|| BusError::rpc(codes::UNKNOWN_ACTION, format!("Unknown action: {}", params.action)))?;
        self
          .main
          .post(MainMessage::Activate(action))
          .map_err(|_| BusError::Shutdown)?;
        Ok(BusResponse::Activated)
      }
      BusRequest::Status => Ok(BusResponse::Status(StatusInfo {
        db_state: self.state.db_state(),
        num_entries: self.state.num_db_entries(),
        active_updates: self.state.num_active_updates(),
      })),
      BusRequest::AwaitCompletion => Err(BusError::rpc(
        codes::UNKNOWN_ACTION,
        "await_completion is not served by the primary instance",
      )),
    }
  }
}

// ============================================================================
// Primary instance
// ============================================================================

/// Run the primary instance until ctrl-c.
///
/// Exits quietly when another primary already owns the bus name.
pub async fn run_primary(runtime: RuntimeConfig) -> Result<(), ApplicationError> {
  let owner = match bus::name::acquire(&runtime.bus, bus::PRIMARY_NAME).await? {
    Acquisition::Owned(owner) => owner,
    Acquisition::Taken => {
      info!("fsearch is already running");
      return Ok(());
    }
  };

  let config = Config::load_or_default(runtime.config_path.as_deref())?;
  let mut app = Application::new(runtime, config, Arc::new(FsEngine::new()))?;
  app.subscribe(log_event);

  let cancel = CancellationToken::new();
  let server = BusServer::new(owner, Arc::new(app.primary_handler()));
  let server_handle = tokio::spawn(server.run(cancel.child_token()));

  // Handle ctrl-c gracefully
  let cancel_for_signal = cancel.clone();
  tokio::spawn(async move {
    if let Err(e) = signal::ctrl_c().await {
      warn!("Failed to listen for ctrl-c: {}", e);
      return;
    }
    info!("Received ctrl-c, shutting down...");
    cancel_for_signal.cancel();
  });

  app.activate()?;
  info!("Primary instance running");
  app.run(cancel.clone()).await;

  cancel.cancel();
  app.shutdown().await;
  match server_handle.await {
    Ok(Ok(())) => {}
    Ok(Err(e)) => warn!("Bus server error: {}", e),
    Err(e) => warn!("Bus server task failed: {}", e),
  }

  info!("Shutdown complete");
  Ok(())
}

/// Observer that stands in for the UI: every event goes to the log.
fn log_event(event: &AppEvent) {
  match event {
    AppEvent::Progress(text) => debug!(status = %text, "Indexing"),
    AppEvent::DatabaseReplaced { num_entries } => info!(num_entries, "Database replaced"),
    other => debug!(event = ?other, "Application event"),
  }
}
