//! Resettable cancellation flag for database updates.
//!
//! `tokio_util::sync::CancellationToken` cannot be un-cancelled, but an update
//! token is reused across requests: it is set by the cancel action, polled by
//! the engine between I/O steps, and reset by the worker once the outcome of
//! the current request has been recorded.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// Shared cancellation flag polled by long-running engine calls.
///
/// Cloning is cheap and every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct UpdateCancellation {
  flag: Arc<AtomicBool>,
}

impl UpdateCancellation {
  pub fn new() -> Self {
    Self::default()
  }

  /// Request cancellation of the running update.
  pub fn cancel(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::Relaxed)
  }

  /// Clear the flag so the next update starts clean.
  pub fn reset(&self) {
    self.flag.store(false, Ordering::SeqCst);
  }
}
