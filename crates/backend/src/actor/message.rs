//! Message types for the update worker and the main context
//!
//! The worker consumes [`UpdateRequest`]s. Everything that must reach the main
//! context (state changes, progress text, completion) travels as a
//! [`MainMessage`] through the main queue.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
  domain::database::Snapshot,
  state::{ActionState, DatabaseState},
};

// ============================================================================
// Update Requests
// ============================================================================

/// What an update request does to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
  /// Rebuild from the filesystem
  Scan,
  /// Read the previously saved database file
  Load,
}

/// Invoked on the worker thread right before the engine runs.
pub type StartedCallback = Box<dyn FnOnce(UpdateAction) + Send>;

/// Invoked exactly once per request, on the worker thread.
pub type FinishedCallback = Box<dyn FnOnce(FinishedUpdate) + Send>;

/// A queued unit of work. Consumed exactly once by the worker.
pub struct UpdateRequest {
  pub id: u64,
  pub action: UpdateAction,
  pub on_started: StartedCallback,
  pub on_finished: FinishedCallback,
}

impl fmt::Debug for UpdateRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("UpdateRequest")
      .field("id", &self.id)
      .field("action", &self.action)
      .finish_non_exhaustive()
  }
}

/// Result of executing one request.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
  /// New snapshot, ready to be installed
  Completed(Snapshot),
  Failed,
  Cancelled,
}

impl UpdateOutcome {
  pub fn kind(&self) -> OutcomeKind {
    match self {
      UpdateOutcome::Completed(_) => OutcomeKind::Completed,
      UpdateOutcome::Failed => OutcomeKind::Failed,
      UpdateOutcome::Cancelled => OutcomeKind::Cancelled,
    }
  }
}

/// [`UpdateOutcome`] without the payload, for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
  Completed,
  Failed,
  Cancelled,
}

#[derive(Debug)]
pub struct FinishedUpdate {
  pub id: u64,
  pub action: UpdateAction,
  pub outcome: UpdateOutcome,
  pub elapsed: Duration,
}

// ============================================================================
// Observer Events
// ============================================================================

/// Notification delivered to observers on the main context.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
  DatabaseStateChanged(DatabaseState),
  LoadStarted,
  ScanStarted,
  UpdateFinished { action: UpdateAction, outcome: OutcomeKind },
  /// Engine status text (only with `show_indexing_status`)
  Progress(String),
  ActionsChanged(ActionState),
  /// A new snapshot was installed; views should refresh
  DatabaseReplaced { num_entries: usize },
}

// ============================================================================
// Actions
// ============================================================================

/// Named actions exposed to the UI and over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
  UpdateDatabase,
  CancelUpdateDatabase,
}

impl Action {
  pub const ALL: [Action; 2] = [Action::UpdateDatabase, Action::CancelUpdateDatabase];

  pub fn name(self) -> &'static str {
    match self {
      Action::UpdateDatabase => "update_database",
      Action::CancelUpdateDatabase => "cancel_update_database",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|a| a.name() == name)
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

// ============================================================================
// Main Context Messages
// ============================================================================

/// Everything posted to the main context.
#[derive(Debug)]
pub enum MainMessage {
  Event(AppEvent),
  Finished(FinishedUpdate),
  /// Enqueue an update from outside the main context
  Submit(UpdateAction),
  /// Activate a named action as if the user had triggered it
  Activate(Action),
}
