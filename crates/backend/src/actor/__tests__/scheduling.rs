//! Scheduler tests: queueing, the active-update counter, action enablement,
//! cancellation and shutdown.

#[cfg(test)]
mod tests {
  use std::{
    sync::{Arc, Mutex},
    time::Duration,
  };

  use pretty_assertions::assert_eq;

  use crate::{
    actor::{
      __tests__::helpers::{MockEngine, TestApp, test_config, wait_for},
      message::{Action, AppEvent, MainMessage, OutcomeKind, UpdateAction},
    },
    state::{ActionState, DatabaseState},
  };

  const BUSY: ActionState = ActionState {
    update_enabled: false,
    cancel_enabled: true,
  };

  // ==========================================================================
  // Counter and ordering
  // ==========================================================================

  #[tokio::test]
  async fn test_counter_tracks_submitted_minus_finished() {
    let mut t = TestApp::new(MockEngine::slow(2, Duration::from_millis(2)), test_config());

    let state = t.app.state().clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    t.app.subscribe(move |event| {
      if let AppEvent::UpdateFinished { .. } = event {
        sink.lock().unwrap().push(state.num_active_updates());
      }
    });

    for _ in 0..5 {
      t.app.update_database().unwrap();
    }
    assert_eq!(t.app.state().num_active_updates(), 5);

    t.app.run_until_idle().await;

    assert_eq!(*seen.lock().unwrap(), vec![4, 3, 2, 1, 0]);
    assert_eq!(t.app.state().num_active_updates(), 0);
  }

  #[tokio::test]
  async fn test_single_worker_under_burst() {
    // No follow-up scans for failed loads
    let mut config = test_config();
    config.database.update_database_on_launch = true;
    let mut t = TestApp::new(MockEngine::slow(3, Duration::from_millis(2)), config);

    for i in 0..12 {
      let action = if i % 3 == 0 { UpdateAction::Load } else { UpdateAction::Scan };
      t.app.handle().post(MainMessage::Submit(action)).unwrap();
    }
    t.app.run_until_idle().await;

    assert_eq!(t.engine.max_running(), 1);
    assert_eq!(t.engine.scans(), 8);
    assert_eq!(t.engine.loads(), 4);
    assert_eq!(t.outcomes().len(), 12);
  }

  #[tokio::test]
  async fn test_requests_run_in_submission_order() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());

    t.app.update_database().unwrap();
    t.app.handle().post(MainMessage::Submit(UpdateAction::Load)).unwrap();
    t.app.process_pending();
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;

    let started: Vec<AppEvent> = t
      .events()
      .into_iter()
      .filter(|e| matches!(e, AppEvent::ScanStarted | AppEvent::LoadStarted))
      .collect();
    assert_eq!(
      started,
      vec![AppEvent::ScanStarted, AppEvent::LoadStarted, AppEvent::ScanStarted]
    );
  }

  // ==========================================================================
  // Actions
  // ==========================================================================

  #[tokio::test]
  async fn test_actions_toggle_once_per_busy_period() {
    let mut t = TestApp::new(MockEngine::slow(2, Duration::from_millis(2)), test_config());

    for _ in 0..3 {
      t.app.update_database().unwrap();
    }
    assert_eq!(t.app.state().actions(), BUSY);
    t.app.run_until_idle().await;

    let changes: Vec<ActionState> = t
      .events()
      .into_iter()
      .filter_map(|e| match e {
        AppEvent::ActionsChanged(actions) => Some(actions),
        _ => None,
      })
      .collect();
    assert_eq!(changes, vec![BUSY, ActionState::default()]);
    assert_eq!(t.app.state().actions(), ActionState::default());
  }

  #[tokio::test]
  async fn test_disabled_actions_are_ignored() {
    let mut t = TestApp::new(MockEngine::slow(20, Duration::from_millis(5)), test_config());

    // Nothing to cancel while idle
    assert!(!t.app.activate_action(Action::CancelUpdateDatabase));

    assert!(t.app.activate_action(Action::UpdateDatabase));
    assert!(!t.app.activate_action(Action::UpdateDatabase));
    assert_eq!(t.app.state().num_active_updates(), 1);

    t.app.run_until_idle().await;
    assert_eq!(t.engine.scans(), 1);
    assert!(t.app.activate_action(Action::UpdateDatabase));
    t.app.run_until_idle().await;
    assert_eq!(t.engine.scans(), 2);
  }

  // ==========================================================================
  // Cancellation
  // ==========================================================================

  #[tokio::test]
  async fn test_cancel_without_active_update_is_noop() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());

    assert!(!t.app.cancel_update());
    assert_eq!(t.app.state().db_state(), DatabaseState::Idle);
    assert!(!t.app.state().cancellation().is_cancelled());

    // The next scan is not affected
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;
    assert_eq!(t.outcomes(), vec![OutcomeKind::Completed]);
  }

  #[tokio::test]
  async fn test_cancel_only_affects_running_request() {
    let mut t = TestApp::new(MockEngine::slow(200, Duration::from_millis(5)), test_config());

    t.app.update_database().unwrap();
    t.app.update_database().unwrap();

    let engine = t.engine.clone();
    assert!(wait_for(|| engine.running() == 1, Duration::from_secs(5)).await);
    assert!(t.app.cancel_update());

    // Let the second scan run to completion
    t.app.run_until_idle().await;

    assert_eq!(t.outcomes(), vec![OutcomeKind::Cancelled, OutcomeKind::Completed]);
    assert_eq!(t.engine.scans(), 2);
    assert!(!t.app.state().cancellation().is_cancelled());
    assert_eq!(t.app.state().db_state(), DatabaseState::Idle);
  }

  #[tokio::test]
  async fn test_late_cancel_does_not_reach_next_scan() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());

    t.app.update_database().unwrap();
    let engine = t.engine.clone();
    let state = t.app.state().clone();
    assert!(
      wait_for(
        || engine.scans() == 1 && state.db_state() == DatabaseState::Idle,
        Duration::from_secs(5)
      )
      .await
    );

    // The worker is done but the finish is still queued, so cancel is enabled
    assert!(t.app.activate_action(Action::CancelUpdateDatabase));
    t.app.run_until_idle().await;
    assert!(!t.app.state().cancellation().is_cancelled());

    t.app.update_database().unwrap();
    t.app.run_until_idle().await;

    assert_eq!(t.outcomes(), vec![OutcomeKind::Completed, OutcomeKind::Completed]);
    assert_eq!(t.engine.scans(), 2);
  }

  #[tokio::test]
  async fn test_cancel_action_through_main_queue() {
    let mut t = TestApp::new(MockEngine::slow(200, Duration::from_millis(5)), test_config());

    t.app.update_database().unwrap();
    let engine = t.engine.clone();
    assert!(wait_for(|| engine.running() == 1, Duration::from_secs(5)).await);

    t.app
      .handle()
      .post(MainMessage::Activate(Action::CancelUpdateDatabase))
      .unwrap();
    t.app.run_until_idle().await;

    assert_eq!(t.outcomes(), vec![OutcomeKind::Cancelled]);
    assert!(t.app.snapshot().is_none());
  }

  // ==========================================================================
  // Shutdown
  // ==========================================================================

  #[tokio::test]
  async fn test_shutdown_skips_queued_requests() {
    let mut t = TestApp::new(MockEngine::slow(200, Duration::from_millis(5)), test_config());

    for _ in 0..3 {
      t.app.update_database().unwrap();
    }
    let engine = t.engine.clone();
    assert!(wait_for(|| engine.running() == 1, Duration::from_secs(5)).await);

    t.app.shutdown().await;

    assert_eq!(t.engine.scans(), 1);
    assert_eq!(t.app.state().num_active_updates(), 0);
    assert!(t.app.snapshot().is_none());
    assert!(t.app.update_database().is_err());
  }

  #[tokio::test]
  async fn test_shutdown_when_idle() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());
    t.app.shutdown().await;
    assert_eq!(t.engine.scans(), 0);
    assert!(t.app.state().is_shutting_down());
  }
}
