//! Index engine contract.
//!
//! The orchestrator never looks inside a database; it only allocates one,
//! asks the engine to fill it (`scan` or `load`), and persists it (`save`).
//! Engines run on the update worker thread and may block.

pub mod fs;

use std::path::{Path, PathBuf};

pub use fs::FsEngine;

use crate::{
  cancel::UpdateCancellation,
  domain::database::{Database, IndexSpec},
};

/// File name of the persisted database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "fsearch.db";

/// Receives human-readable progress text. Called on the worker thread.
pub type ProgressSink<'a> = Option<&'a dyn Fn(&str)>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("Update cancelled")]
  Cancelled,
  #[error("IO error at {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Invalid database file {path:?}: {message}")]
  Corrupt { path: PathBuf, message: String },
  #[error("Invalid exclude pattern {pattern:?}: {message}")]
  Pattern { pattern: String, message: String },
}

impl EngineError {
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}

/// Builds, loads and saves database snapshots.
pub trait IndexEngine: Send + Sync + 'static {
  /// Allocate an empty snapshot. No I/O.
  fn new_snapshot(&self, spec: &IndexSpec) -> Database {
    Database::new(spec.clone())
  }

  /// Populate `db` from the filesystem, polling `cancel` between steps.
  fn scan(&self, db: &mut Database, cancel: &UpdateCancellation, progress: ProgressSink<'_>)
  -> Result<(), EngineError>;

  /// Populate `db` from a previously saved file.
  fn load(&self, db: &mut Database, file: &Path, progress: ProgressSink<'_>) -> Result<(), EngineError>;

  /// Persist `db` into `dir`.
  fn save(&self, db: &Database, dir: &Path) -> Result<(), EngineError>;
}
