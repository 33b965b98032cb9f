//! Shared application state.
//!
//! One `parking_lot::Mutex` guards the database state, the current snapshot,
//! the in-flight counter, the action enablement and the active configuration.
//! The cancellation flag lives outside the lock so the engine can poll it
//! without contention.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
  actor::message::UpdateOutcome,
  cancel::UpdateCancellation,
  domain::{config::Config, database::Snapshot},
};

/// What the worker is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
  #[default]
  Idle,
  Loading,
  Scanning,
}

impl DatabaseState {
  pub fn as_str(self) -> &'static str {
    match self {
      DatabaseState::Idle => "idle",
      DatabaseState::Loading => "loading",
      DatabaseState::Scanning => "scanning",
    }
  }
}

/// Enablement of the two database actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
  pub update_enabled: bool,
  pub cancel_enabled: bool,
}

impl Default for ActionState {
  fn default() -> Self {
    Self {
      update_enabled: true,
      cancel_enabled: false,
    }
  }
}

impl ActionState {
  fn busy() -> Self {
    Self {
      update_enabled: false,
      cancel_enabled: true,
    }
  }
}

/// What [`AppState::finish_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishReport {
  /// A new snapshot replaced the current one
  pub installed: bool,
  /// New action enablement if it changed
  pub actions: Option<ActionState>,
  pub shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
  db_state: DatabaseState,
  database: Option<Snapshot>,
  num_active_updates: usize,
  actions: ActionState,
  config: Arc<Config>,
  shutting_down: bool,
}

#[derive(Debug)]
pub struct AppState {
  inner: Mutex<Inner>,
  cancel: UpdateCancellation,
}

impl AppState {
  pub fn new(config: Config) -> Self {
    Self {
      inner: Mutex::new(Inner {
        db_state: DatabaseState::Idle,
        database: None,
        num_active_updates: 0,
        actions: ActionState::default(),
        config: Arc::new(config),
        shutting_down: false,
      }),
      cancel: UpdateCancellation::new(),
    }
  }

  pub fn db_state(&self) -> DatabaseState {
    self.inner.lock().db_state
  }

  pub fn set_db_state(&self, state: DatabaseState) {
    self.inner.lock().db_state = state;
  }

  /// The installed snapshot, if any.
  pub fn database(&self) -> Option<Snapshot> {
    self.inner.lock().database.clone()
  }

  pub fn num_db_entries(&self) -> usize {
    self.inner.lock().database.as_ref().map_or(0, |db| db.num_entries())
  }

  pub fn num_active_updates(&self) -> usize {
    self.inner.lock().num_active_updates
  }

  pub fn actions(&self) -> ActionState {
    self.inner.lock().actions
  }

  pub fn config(&self) -> Arc<Config> {
    self.inner.lock().config.clone()
  }

  pub fn set_config(&self, config: Config) {
    self.inner.lock().config = Arc::new(config);
  }

  pub fn cancellation(&self) -> &UpdateCancellation {
    &self.cancel
  }

  pub fn is_shutting_down(&self) -> bool {
    self.inner.lock().shutting_down
  }

  pub fn begin_shutdown(&self) {
    self.inner.lock().shutting_down = true;
  }

  /// Count a newly submitted request.
  ///
  /// Returns the new action state on the 0 → 1 transition. A busy period
  /// always starts with a clear cancellation flag.
  pub fn begin_update(&self) -> Option<ActionState> {
    let mut inner = self.inner.lock();
    inner.num_active_updates += 1;
    if inner.num_active_updates == 1 {
      self.cancel.reset();
      inner.actions = ActionState::busy();
      return Some(inner.actions);
    }
    None
  }

  /// Account for a finished request and install its snapshot.
  ///
  /// The old snapshot is released inside the lock, so readers see either the
  /// old or the new one, never neither.
  pub fn finish_update(&self, outcome: UpdateOutcome) -> FinishReport {
    let mut inner = self.inner.lock();

    let mut installed = false;
    if let UpdateOutcome::Completed(snapshot) = outcome
      && !inner.shutting_down
    {
      inner.database = Some(snapshot);
      installed = true;
    }

    if inner.num_active_updates == 0 {
      warn!("Finished update with no active updates");
    } else {
      inner.num_active_updates -= 1;
    }

    // A cancel that raced the last finish has nothing left to stop
    if inner.num_active_updates == 0 {
      self.cancel.reset();
    }

    let mut actions = None;
    if inner.num_active_updates == 0 && inner.actions != ActionState::default() {
      inner.actions = ActionState::default();
      actions = Some(inner.actions);
    }

    FinishReport {
      installed,
      actions,
      shutting_down: inner.shutting_down,
    }
  }

  /// Cancel the running update. No-op when nothing is active.
  pub fn request_cancel(&self) -> bool {
    // Hold the lock so the check and the flag agree with submit/finish
    let inner = self.inner.lock();
    if inner.num_active_updates == 0 {
      return false;
    }
    self.cancel.cancel();
    true
  }
}
