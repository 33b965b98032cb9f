use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  thread::JoinHandle,
};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
  handle::MainHandle,
  message::{AppEvent, FinishedUpdate, MainMessage, UpdateAction, UpdateOutcome, UpdateRequest},
  worker::UpdateWorker,
};
use crate::{engine::IndexEngine, state::AppState};

const WORKER_THREAD_NAME: &str = "db-update";

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
  #[error("Update scheduler has shut down")]
  ShutDown,
  #[error("Failed to spawn update worker: {0}")]
  Spawn(#[from] std::io::Error),
}

/// Serializes database updates onto a single worker thread.
///
/// Requests run one at a time in submission order. Every submitted request
/// produces exactly one [`MainMessage::Finished`] on the main queue, which is
/// where the active-update counter is decremented.
pub struct UpdateScheduler {
  tx: Option<mpsc::UnboundedSender<UpdateRequest>>,
  worker: Option<JoinHandle<()>>,
  state: Arc<AppState>,
  main: MainHandle,
  next_id: AtomicU64,
}

impl UpdateScheduler {
  /// Spawn the worker thread.
  pub fn new(
    engine: Arc<dyn IndexEngine>,
    state: Arc<AppState>,
    main: MainHandle,
    data_dir: PathBuf,
  ) -> Result<Self, SchedulerError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = UpdateWorker {
      engine,
      state: state.clone(),
      main: main.clone(),
      data_dir,
    };
    let handle = std::thread::Builder::new()
      .name(WORKER_THREAD_NAME.to_string())
      .spawn(move || worker.run(rx))?;

    Ok(Self {
      tx: Some(tx),
      worker: Some(handle),
      state,
      main,
      next_id: AtomicU64::new(1),
    })
  }

  /// Queue a scan or load. Returns the request id.
  pub fn submit(&self, action: UpdateAction) -> Result<u64, SchedulerError> {
    let tx = match &self.tx {
      Some(tx) if !self.state.is_shutting_down() => tx,
      _ => return Err(SchedulerError::ShutDown),
    };

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    if let Some(actions) = self.state.begin_update() {
      let _ = self.main.emit(AppEvent::ActionsChanged(actions));
    }

    let started = self.main.clone();
    let finished = self.main.clone();
    let request = UpdateRequest {
      id,
      action,
      on_started: Box::new(move |action| {
        let event = match action {
          UpdateAction::Scan => AppEvent::ScanStarted,
          UpdateAction::Load => AppEvent::LoadStarted,
        };
        let _ = started.emit(event);
      }),
      on_finished: Box::new(move |update| {
        let _ = finished.post(MainMessage::Finished(update));
      }),
    };

    if let Err(mpsc::error::SendError(request)) = tx.send(request) {
      // Worker is gone; the counter was already bumped, so still report back
      warn!(id, ?action, "Update worker unavailable");
      (request.on_finished)(FinishedUpdate {
        id,
        action,
        outcome: UpdateOutcome::Failed,
        elapsed: Default::default(),
      });
      return Ok(id);
    }

    debug!(id, ?action, "Update queued");
    Ok(id)
  }

  /// Cancel the running update. Returns `false` when nothing is active.
  ///
  /// Queued requests are not affected.
  pub fn cancel(&self) -> bool {
    let cancelled = self.state.request_cancel();
    if cancelled {
      info!("Database update cancellation requested");
    }
    cancelled
  }

  /// Stop accepting requests, cancel the running one and join the worker.
  ///
  /// Queued requests are skipped but still report `Cancelled`.
  pub async fn shutdown(&mut self) {
    self.state.begin_shutdown();
    self.state.cancellation().cancel();
    self.tx.take();

    let Some(handle) = self.worker.take() else {
      return;
    };
    match tokio::task::spawn_blocking(move || handle.join()).await {
      Ok(Ok(())) => debug!("Update worker joined"),
      Ok(Err(_)) => warn!("Update worker panicked"),
      Err(e) => warn!(error = %e, "Failed to join update worker"),
    }
  }
}

impl Drop for UpdateScheduler {
  fn drop(&mut self) {
    // Without an explicit shutdown the worker exits once the queue drains
    if self.worker.is_some() {
      self.state.cancellation().cancel();
      self.state.begin_shutdown();
    }
  }
}
