//! Database snapshot types.
//!
//! A [`Database`] is populated once by the engine on the worker thread and is
//! immutable after it is wrapped in a [`Snapshot`]. Readers clone the `Arc`
//! and never need the state lock to read entries.

use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

/// Shared, reference-counted handle to an installed database.
pub type Snapshot = Arc<Database>;

/// What to index and what to leave out, derived from the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
  /// Root directories to index
  pub index_paths: Vec<PathBuf>,
  /// Directories excluded together with everything below them
  pub exclude_paths: Vec<PathBuf>,
  /// Glob patterns matched against file names
  pub exclude_patterns: Vec<String>,
  /// Skip dot-files and dot-directories
  pub exclude_hidden: bool,
}

/// A single indexed filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  pub path: PathBuf,
  pub is_dir: bool,
  pub size: u64,
}

/// In-memory index built from an [`IndexSpec`].
#[derive(Debug, Default)]
pub struct Database {
  spec: IndexSpec,
  entries: Vec<Entry>,
}

impl Database {
  /// Allocate an empty database for the given spec. Does no I/O.
  pub fn new(spec: IndexSpec) -> Self {
    Self {
      spec,
      entries: Vec::new(),
    }
  }

  pub fn spec(&self) -> &IndexSpec {
    &self.spec
  }

  pub fn entries(&self) -> &[Entry] {
    &self.entries
  }

  pub fn num_entries(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Replace the contents. Only engines call this, before the snapshot is shared.
  pub fn set_entries(&mut self, entries: Vec<Entry>) {
    self.entries = entries;
  }

  pub fn push(&mut self, entry: Entry) {
    self.entries.push(entry);
  }

  /// Look up an entry by exact path.
  pub fn find(&self, path: &std::path::Path) -> Option<&Entry> {
    self.entries.iter().find(|e| e.path == path)
  }
}
