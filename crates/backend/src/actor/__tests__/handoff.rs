//! Snapshot handoff tests: state transitions, installation, retention of the
//! previous snapshot on failure or cancellation, and startup behavior.

#[cfg(test)]
mod tests {
  use std::{
    sync::{Arc, Weak, atomic::Ordering},
    time::Duration,
  };

  use pretty_assertions::assert_eq;

  use crate::{
    actor::{
      __tests__::helpers::{MockEngine, TestApp, test_config, wait_for},
      message::{AppEvent, OutcomeKind, UpdateAction},
    },
    domain::database::Database,
    state::{ActionState, DatabaseState},
  };

  // ==========================================================================
  // Scan handoff
  // ==========================================================================

  #[tokio::test]
  async fn test_scan_from_idle() {
    let mut config = test_config();
    config.database.show_indexing_status = false;
    let mut t = TestApp::new(MockEngine::instant(), config);
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;
    let first = t.app.snapshot().unwrap();

    t.events.lock().unwrap().clear();
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;
    let second = t.app.snapshot().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.num_entries(), 2);
    assert_eq!(t.app.state().db_state(), DatabaseState::Idle);

    let busy = ActionState {
      update_enabled: false,
      cancel_enabled: true,
    };
    assert_eq!(
      t.events(),
      vec![
        AppEvent::ActionsChanged(busy),
        AppEvent::DatabaseStateChanged(DatabaseState::Scanning),
        AppEvent::ScanStarted,
        AppEvent::DatabaseStateChanged(DatabaseState::Idle),
        AppEvent::DatabaseReplaced { num_entries: 2 },
        AppEvent::ActionsChanged(ActionState::default()),
        AppEvent::UpdateFinished {
          action: UpdateAction::Scan,
          outcome: OutcomeKind::Completed
        },
      ]
    );
  }

  #[tokio::test]
  async fn test_cancelled_scan_keeps_snapshot() {
    let mut t = TestApp::new(MockEngine::slow(100, Duration::from_millis(5)), test_config());
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;
    let installed = t.app.snapshot().unwrap();

    t.app.update_database().unwrap();
    let engine = t.engine.clone();
    assert!(wait_for(|| engine.running() == 1, Duration::from_secs(5)).await);
    assert!(t.app.cancel_update());
    t.app.run_until_idle().await;

    assert_eq!(t.outcomes(), vec![OutcomeKind::Completed, OutcomeKind::Cancelled]);
    assert!(Arc::ptr_eq(&t.app.snapshot().unwrap(), &installed));
    assert_eq!(t.engine.saves(), 1);
  }

  #[tokio::test]
  async fn test_failed_scan_keeps_snapshot() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;
    let installed = t.app.snapshot().unwrap();

    t.engine.fail_scan.store(true, Ordering::SeqCst);
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;

    assert_eq!(t.outcomes(), vec![OutcomeKind::Completed, OutcomeKind::Failed]);
    assert!(Arc::ptr_eq(&t.app.snapshot().unwrap(), &installed));
    assert_eq!(t.engine.saves(), 1);
  }

  #[tokio::test]
  async fn test_engine_panic_is_reported_as_failure() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());
    t.engine.panic_scan.store(true, Ordering::SeqCst);
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;

    assert_eq!(t.outcomes(), vec![OutcomeKind::Failed]);
    assert_eq!(t.app.state().db_state(), DatabaseState::Idle);
    assert_eq!(t.app.state().num_active_updates(), 0);

    // The worker survives
    t.engine.panic_scan.store(false, Ordering::SeqCst);
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;
    assert_eq!(t.outcomes(), vec![OutcomeKind::Failed, OutcomeKind::Completed]);
  }

  #[tokio::test]
  async fn test_repeated_scans_release_old_snapshots() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());
    let mut retired: Vec<Weak<Database>> = Vec::new();

    for _ in 0..10 {
      t.app.update_database().unwrap();
      t.app.run_until_idle().await;
      retired.push(Arc::downgrade(&t.app.snapshot().unwrap()));
    }

    let current = retired.pop().unwrap();
    assert!(retired.iter().all(|weak| weak.upgrade().is_none()));

    let current = current.upgrade().unwrap();
    // One reference in the state, one here
    assert_eq!(Arc::strong_count(&current), 2);
  }

  // ==========================================================================
  // Progress
  // ==========================================================================

  #[tokio::test]
  async fn test_progress_follows_show_indexing_status() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());
    t.app.update_database().unwrap();
    t.app.run_until_idle().await;

    let progress: Vec<String> = t
      .events()
      .into_iter()
      .filter_map(|e| match e {
        AppEvent::Progress(text) => Some(text),
        _ => None,
      })
      .collect();
    assert_eq!(progress, vec!["Scanning generation 1".to_string(), "Saving…".to_string()]);

    let mut config = test_config();
    config.database.show_indexing_status = false;
    let mut quiet = TestApp::new(MockEngine::instant(), config);
    quiet.app.update_database().unwrap();
    quiet.app.run_until_idle().await;
    assert!(!quiet.events().iter().any(|e| matches!(e, AppEvent::Progress(_))));
  }

  // ==========================================================================
  // Startup
  // ==========================================================================

  #[tokio::test]
  async fn test_failed_load_schedules_scan() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());
    t.app.activate().unwrap();
    t.app.run_until_idle().await;

    assert_eq!(t.engine.loads(), 1);
    assert_eq!(t.engine.scans(), 1);
    assert_eq!(t.outcomes(), vec![OutcomeKind::Failed, OutcomeKind::Completed]);
    assert!(t.app.snapshot().is_some());
    assert!(t.data_dir().join("fsearch.db").exists());
  }

  #[tokio::test]
  async fn test_failed_load_with_launch_scan_scans_once() {
    let mut config = test_config();
    config.database.update_database_on_launch = true;
    let mut t = TestApp::new(MockEngine::instant(), config);
    t.app.activate().unwrap();
    t.app.run_until_idle().await;

    assert_eq!(t.engine.loads(), 1);
    assert_eq!(t.engine.scans(), 1);
  }

  #[tokio::test]
  async fn test_load_installs_saved_database() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());
    std::fs::create_dir_all(t.data_dir()).unwrap();
    std::fs::write(t.data_dir().join("fsearch.db"), "1").unwrap();

    t.app.activate().unwrap();
    t.app.run_until_idle().await;

    assert_eq!(t.engine.scans(), 0);
    assert_eq!(t.outcomes(), vec![OutcomeKind::Completed]);
    assert!(t.events().contains(&AppEvent::LoadStarted));
    assert_eq!(t.app.snapshot().unwrap().num_entries(), 1);
  }

  // ==========================================================================
  // Configuration
  // ==========================================================================

  #[tokio::test]
  async fn test_apply_config_rescans_on_index_change() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());

    let mut config = test_config();
    config.database.show_indexing_status = false;
    let diff = t.app.apply_config(config).unwrap();
    assert!(!diff.database_config_changed);
    assert_eq!(t.app.state().num_active_updates(), 0);

    let mut config = test_config();
    config.database.exclude_files = vec!["*.o".to_string()];
    let diff = t.app.apply_config(config.clone()).unwrap();
    assert!(diff.database_config_changed);
    t.app.run_until_idle().await;
    assert_eq!(t.engine.scans(), 1);

    // Persisted for the next start
    let path = t.root.path().join("config").join("fsearch.toml");
    assert_eq!(crate::config::Config::load_from(&path).unwrap(), config);
  }

  #[tokio::test(start_paused = true)]
  async fn test_auto_update_goes_through_action() {
    let mut t = TestApp::new(MockEngine::instant(), test_config());

    let mut config = test_config();
    config.database.update_database_every = true;
    config.database.update_database_every_minutes = 1;
    let diff = t.app.apply_config(config).unwrap();
    assert!(diff.auto_update_changed);
    assert_eq!(t.engine.scans(), 0);

    tokio::time::sleep(Duration::from_secs(61)).await;
    t.app.process_pending();
    assert!(t.app.state().num_active_updates() >= 1);
    t.app.run_until_idle().await;

    assert!(t.engine.scans() >= 1);
    assert!(t.app.snapshot().is_some());
  }
}
