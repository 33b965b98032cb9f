//! Test helpers for update scheduling tests.
//!
//! Provides `MockEngine`, an index engine that records how it is driven, and
//! `TestApp`, which wires an `Application` to temporary directories.

use std::{
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use tempfile::TempDir;

use crate::{
  actor::message::{AppEvent, OutcomeKind},
  application::{Application, RuntimeConfig},
  bus::BusConfig,
  cancel::UpdateCancellation,
  domain::{
    config::Config,
    database::{Database, Entry},
  },
  engine::{DATABASE_FILE_NAME, EngineError, IndexEngine, ProgressSink},
};

// ============================================================================
// Mock Engine
// ============================================================================

/// Engine double that counts calls and tracks concurrent execution.
///
/// A scan takes `steps` steps of `step_delay` each and checks the
/// cancellation flag between steps. Every completed scan produces a distinct
/// set of entries.
#[derive(Debug, Default)]
pub struct MockEngine {
  pub scans: AtomicUsize,
  pub loads: AtomicUsize,
  pub saves: AtomicUsize,
  running: AtomicUsize,
  max_running: AtomicUsize,
  pub steps: usize,
  pub step_delay: Duration,
  pub fail_scan: AtomicBool,
  pub fail_load: AtomicBool,
  pub panic_scan: AtomicBool,
}

/// Decrements the running counter even if the scan panics.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

impl MockEngine {
  /// Scans complete immediately.
  pub fn instant() -> Self {
    Self::default()
  }

  /// Scans take `steps * step_delay`.
  pub fn slow(steps: usize, step_delay: Duration) -> Self {
    Self {
      steps,
      step_delay,
      ..Default::default()
    }
  }

  pub fn scans(&self) -> usize {
    self.scans.load(Ordering::SeqCst)
  }

  pub fn loads(&self) -> usize {
    self.loads.load(Ordering::SeqCst)
  }

  pub fn saves(&self) -> usize {
    self.saves.load(Ordering::SeqCst)
  }

  pub fn running(&self) -> usize {
    self.running.load(Ordering::SeqCst)
  }

  pub fn max_running(&self) -> usize {
    self.max_running.load(Ordering::SeqCst)
  }

  fn enter(&self) -> RunningGuard<'_> {
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_running.fetch_max(now, Ordering::SeqCst);
    RunningGuard(&self.running)
  }
}

impl IndexEngine for MockEngine {
  fn scan(&self, db: &mut Database, cancel: &UpdateCancellation, progress: ProgressSink<'_>) -> Result<(), EngineError> {
    let generation = self.scans.fetch_add(1, Ordering::SeqCst) + 1;
    let _guard = self.enter();

    if let Some(report) = progress {
      report(&format!("Scanning generation {}", generation));
    }

    for _ in 0..self.steps {
      if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }
      std::thread::sleep(self.step_delay);
    }
    if cancel.is_cancelled() {
      return Err(EngineError::Cancelled);
    }

    if self.panic_scan.load(Ordering::SeqCst) {
      panic!("mock engine panic");
    }
    if self.fail_scan.load(Ordering::SeqCst) {
      return Err(EngineError::io(
        "/mock",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mock failure"),
      ));
    }

    for i in 0..generation {
      db.push(Entry {
        path: PathBuf::from(format!("/mock/gen-{}/{}", generation, i)),
        is_dir: false,
        size: i as u64,
      });
    }
    Ok(())
  }

  fn load(&self, db: &mut Database, file: &Path, _progress: ProgressSink<'_>) -> Result<(), EngineError> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    let _guard = self.enter();

    if self.fail_load.load(Ordering::SeqCst) {
      return Err(EngineError::Corrupt {
        path: file.to_path_buf(),
        message: "mock failure".to_string(),
      });
    }
    if !file.exists() {
      return Err(EngineError::io(
        file,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no database file"),
      ));
    }

    db.push(Entry {
      path: PathBuf::from("/mock/loaded"),
      is_dir: false,
      size: 0,
    });
    Ok(())
  }

  fn save(&self, db: &Database, dir: &Path) -> Result<(), EngineError> {
    self.saves.fetch_add(1, Ordering::SeqCst);
    std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
    let file = dir.join(DATABASE_FILE_NAME);
    std::fs::write(&file, db.num_entries().to_string()).map_err(|e| EngineError::io(&file, e))
  }
}

// ============================================================================
// Test Application
// ============================================================================

/// Config that indexes a path the mock engine ignores.
pub fn test_config() -> Config {
  let mut config = Config::default();
  config.database.indexes = vec![PathBuf::from("/mock")];
  config
}

/// Runtime settings rooted in a temporary directory.
pub fn test_runtime(root: &Path) -> RuntimeConfig {
  RuntimeConfig {
    data_dir: root.join("data"),
    config_path: Some(root.join("config").join("fsearch.toml")),
    bus: BusConfig::new(root.join("bus")),
    foreground: true,
  }
}

/// An `Application` over a `MockEngine` that records every event.
pub struct TestApp {
  pub app: Application,
  pub engine: Arc<MockEngine>,
  pub events: Arc<Mutex<Vec<AppEvent>>>,
  pub root: TempDir,
}

impl TestApp {
  pub fn new(engine: MockEngine, config: Config) -> Self {
    let root = TempDir::new().expect("create temp dir");
    let engine = Arc::new(engine);
    let mut app = Application::new(test_runtime(root.path()), config, engine.clone()).expect("create application");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    app.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    Self {
      app,
      engine,
      events,
      root,
    }
  }

  pub fn events(&self) -> Vec<AppEvent> {
    self.events.lock().unwrap().clone()
  }

  /// Outcomes of finished updates, in order.
  pub fn outcomes(&self) -> Vec<OutcomeKind> {
    self
      .events()
      .into_iter()
      .filter_map(|e| match e {
        AppEvent::UpdateFinished { outcome, .. } => Some(outcome),
        _ => None,
      })
      .collect()
  }

  pub fn data_dir(&self) -> PathBuf {
    self.root.path().join("data")
  }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  condition()
}
