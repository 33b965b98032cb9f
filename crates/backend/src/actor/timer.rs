//! Periodic auto-update.
//!
//! The timer never submits directly. Each tick posts
//! `Activate(UpdateDatabase)` to the main context, which ignores it while the
//! action is disabled.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
  handle::MainHandle,
  message::{Action, MainMessage},
};
use crate::domain::config::Config;

pub struct AutoUpdateTimer {
  main: MainHandle,
  /// Cancelled on application shutdown; parent of every armed timer
  parent: CancellationToken,
  current: Option<CancellationToken>,
}

impl AutoUpdateTimer {
  pub fn new(main: MainHandle, parent: CancellationToken) -> Self {
    Self {
      main,
      parent,
      current: None,
    }
  }

  /// Cancel the running timer and start a new one if the config enables it.
  ///
  /// Must be called from within a tokio runtime.
  pub fn rearm(&mut self, config: &Config) -> Option<Duration> {
    self.stop();

    let period = config.auto_update_interval()?;
    let token = self.parent.child_token();
    let main = self.main.clone();
    let cancel = token.clone();

    tokio::spawn(async move {
      let mut ticker = interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // Skip the immediate tick
      ticker.tick().await;

      loop {
        tokio::select! {
          biased;
          _ = cancel.cancelled() => break,
          _ = ticker.tick() => {
            debug!("Auto-update timer fired");
            if main.post(MainMessage::Activate(Action::UpdateDatabase)).is_err() {
              break;
            }
          }
        }
      }
    });

    info!(period_secs = period.as_secs(), "Auto-update timer armed");
    self.current = Some(token);
    Some(period)
  }

  pub fn stop(&mut self) {
    if let Some(token) = self.current.take() {
      token.cancel();
    }
  }

  pub fn is_armed(&self) -> bool {
    self.current.is_some()
  }
}

impl Drop for AutoUpdateTimer {
  fn drop(&mut self) {
    self.stop();
  }
}
