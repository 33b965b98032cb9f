//! The update worker: one OS thread that runs engine calls in FIFO order.
//!
//! Engine calls block on filesystem I/O, so they stay off the async runtime.
//! The thread pulls requests with `blocking_recv` and exits once every sender
//! is gone and the queue is drained.

use std::{
  panic::{AssertUnwindSafe, catch_unwind},
  path::PathBuf,
  sync::Arc,
  time::Instant,
};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
  handle::MainHandle,
  message::{AppEvent, FinishedUpdate, MainMessage, UpdateAction, UpdateOutcome, UpdateRequest},
};
use crate::{
  domain::database::Database,
  engine::{DATABASE_FILE_NAME, EngineError, IndexEngine},
  state::{AppState, DatabaseState},
};

pub(crate) struct UpdateWorker {
  pub engine: Arc<dyn IndexEngine>,
  pub state: Arc<AppState>,
  pub main: MainHandle,
  pub data_dir: PathBuf,
}

impl UpdateWorker {
  /// Thread body. Returns when the request channel is closed and empty.
  pub fn run(self, mut rx: mpsc::UnboundedReceiver<UpdateRequest>) {
    debug!("Update worker started");
    while let Some(request) = rx.blocking_recv() {
      self.execute(request);
    }
    debug!("Update worker stopped");
  }

  fn execute(&self, request: UpdateRequest) {
    let UpdateRequest {
      id,
      action,
      on_started,
      on_finished,
    } = request;
    let start = Instant::now();

    if self.state.is_shutting_down() {
      debug!(id, ?action, "Skipping queued update during shutdown");
      on_finished(FinishedUpdate {
        id,
        action,
        outcome: UpdateOutcome::Cancelled,
        elapsed: start.elapsed(),
      });
      return;
    }

    let busy = match action {
      UpdateAction::Scan => DatabaseState::Scanning,
      UpdateAction::Load => DatabaseState::Loading,
    };
    self.state.set_db_state(busy);
    let _ = self.main.emit(AppEvent::DatabaseStateChanged(busy));
    on_started(action);

    let config = self.state.config();
    let mut db = self.engine.new_snapshot(&config.index_spec());

    let main = self.main.clone();
    let report = move |text: &str| {
      let _ = main.emit(AppEvent::Progress(text.to_string()));
    };
    let progress: Option<&dyn Fn(&str)> = if config.database.show_indexing_status {
      Some(&report)
    } else {
      None
    };

    let result = catch_unwind(AssertUnwindSafe(|| match action {
      UpdateAction::Scan => self.scan_and_save(&mut db, progress),
      UpdateAction::Load => self.load(&mut db, progress),
    }));

    let cancel = self.state.cancellation();
    let outcome = match result {
      Ok(Ok(())) if !cancel.is_cancelled() => UpdateOutcome::Completed(Arc::new(db)),
      Ok(Ok(())) | Ok(Err(EngineError::Cancelled)) => UpdateOutcome::Cancelled,
      Ok(Err(e)) => {
        warn!(id, ?action, error = %e, "Database update failed");
        if action == UpdateAction::Load && !config.database.update_database_on_launch {
          info!("No usable database file, scheduling a scan");
          let _ = self.main.post(MainMessage::Submit(UpdateAction::Scan));
        }
        UpdateOutcome::Failed
      }
      Err(_) => {
        error!(id, ?action, "Index engine panicked");
        UpdateOutcome::Failed
      }
    };
    // The next request must start with a clean flag
    cancel.reset();

    self.state.set_db_state(DatabaseState::Idle);
    let _ = self.main.emit(AppEvent::DatabaseStateChanged(DatabaseState::Idle));

    let elapsed = start.elapsed();
    debug!(id, ?action, outcome = ?outcome.kind(), elapsed_ms = elapsed.as_millis() as u64, "Update finished");
    on_finished(FinishedUpdate {
      id,
      action,
      outcome,
      elapsed,
    });
  }

  fn scan_and_save(&self, db: &mut Database, progress: Option<&dyn Fn(&str)>) -> Result<(), EngineError> {
    let cancel = self.state.cancellation();
    self.engine.scan(db, cancel, progress)?;
    if cancel.is_cancelled() {
      return Err(EngineError::Cancelled);
    }

    if let Some(report) = progress {
      report("Saving…");
    }
    if let Err(e) = self.engine.save(db, &self.data_dir) {
      warn!(dir = %self.data_dir.display(), error = %e, "Failed to save database");
    }
    Ok(())
  }

  fn load(&self, db: &mut Database, progress: Option<&dyn Fn(&str)>) -> Result<(), EngineError> {
    let file = self.data_dir.join(DATABASE_FILE_NAME);
    self.engine.load(db, &file, progress)
  }
}
