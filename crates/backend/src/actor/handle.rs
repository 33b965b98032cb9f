//! Handle for posting to the main context
//!
//! The handle is cheap to clone and safe to use from the worker thread, timer
//! tasks and bus connections. Only the `Application` owns the receiving end.

use tokio::sync::mpsc;

use super::message::{AppEvent, MainMessage};

/// Sender side of the main queue
#[derive(Clone, Debug)]
pub struct MainHandle {
  pub tx: mpsc::UnboundedSender<MainMessage>,
}

impl MainHandle {
  /// Create a handle together with the receiver the main loop drains
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<MainMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  pub fn post(&self, msg: MainMessage) -> Result<(), SendError> {
    self.tx.send(msg).map_err(|_| SendError::MainLoopGone)
  }

  /// Post an observer event
  pub fn emit(&self, event: AppEvent) -> Result<(), SendError> {
    self.post(MainMessage::Event(event))
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when posting to the main context
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Main loop has shut down")]
  MainLoopGone,
}
