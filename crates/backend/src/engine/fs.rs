//! Filesystem engine: walks the index roots with `walkdir` and persists the
//! result as a versioned JSON file.

use std::{
  fs,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DATABASE_FILE_NAME, EngineError, IndexEngine, ProgressSink};
use crate::{
  cancel::UpdateCancellation,
  domain::database::{Database, Entry, IndexSpec},
};

const FORMAT_VERSION: u32 = 1;

/// Progress is reported once per this many entries.
const PROGRESS_EVERY: usize = 1000;

#[derive(Serialize)]
struct DatabaseFileRef<'a> {
  version: u32,
  spec: &'a IndexSpec,
  entries: &'a [Entry],
}

#[derive(Deserialize)]
struct DatabaseFile {
  version: u32,
  spec: IndexSpec,
  entries: Vec<Entry>,
}

/// Compiled exclusion rules for one scan.
struct Excludes {
  paths: Vec<PathBuf>,
  patterns: Vec<glob::Pattern>,
  hidden: bool,
}

impl Excludes {
  fn compile(spec: &IndexSpec) -> Result<Self, EngineError> {
    let patterns = spec
      .exclude_patterns
      .iter()
      .map(|p| {
        glob::Pattern::new(p).map_err(|e| EngineError::Pattern {
          pattern: p.clone(),
          message: e.to_string(),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      paths: spec.exclude_paths.clone(),
      patterns,
      hidden: spec.exclude_hidden,
    })
  }

  fn is_excluded(&self, entry: &walkdir::DirEntry) -> bool {
    // Never filter the root itself by name
    if entry.depth() == 0 {
      return self.paths.iter().any(|p| entry.path().starts_with(p));
    }

    let name = entry.file_name().to_string_lossy();
    if self.hidden && name.starts_with('.') {
      return true;
    }
    if self.patterns.iter().any(|p| p.matches(&name)) {
      return true;
    }
    self.paths.iter().any(|p| entry.path().starts_with(p))
  }
}

/// Engine backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsEngine;

impl FsEngine {
  pub fn new() -> Self {
    Self
  }
}

impl IndexEngine for FsEngine {
  fn scan(&self, db: &mut Database, cancel: &UpdateCancellation, progress: ProgressSink<'_>) -> Result<(), EngineError> {
    let excludes = Excludes::compile(db.spec())?;
    let roots = db.spec().index_paths.clone();
    let mut entries = Vec::new();

    for root in &roots {
      if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }
      if let Some(report) = progress {
        report(&format!("Scanning {}", root.display()));
      }

      let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !excludes.is_excluded(e));

      for item in walker {
        if cancel.is_cancelled() {
          debug!(root = %root.display(), indexed = entries.len(), "Scan cancelled");
          return Err(EngineError::Cancelled);
        }

        let entry = match item {
          Ok(entry) => entry,
          Err(e) => {
            debug!(error = %e, "Skipping unreadable entry");
            continue;
          }
        };

        let is_dir = entry.file_type().is_dir();
        let size = if is_dir {
          0
        } else {
          entry.metadata().map(|m| m.len()).unwrap_or(0)
        };
        entries.push(Entry {
          path: entry.into_path(),
          is_dir,
          size,
        });

        if let Some(report) = progress
          && entries.len() % PROGRESS_EVERY == 0
        {
          report(&format!("Indexed {} entries", entries.len()));
        }
      }
    }

    debug!(roots = roots.len(), entries = entries.len(), "Scan finished");
    db.set_entries(entries);
    Ok(())
  }

  fn load(&self, db: &mut Database, file: &Path, progress: ProgressSink<'_>) -> Result<(), EngineError> {
    if let Some(report) = progress {
      report("Loading database…");
    }

    let content = fs::read(file).map_err(|e| EngineError::io(file, e))?;
    let stored: DatabaseFile = serde_json::from_slice(&content).map_err(|e| EngineError::Corrupt {
      path: file.to_path_buf(),
      message: e.to_string(),
    })?;

    if stored.version != FORMAT_VERSION {
      return Err(EngineError::Corrupt {
        path: file.to_path_buf(),
        message: format!("unsupported format version {}", stored.version),
      });
    }
    if &stored.spec != db.spec() {
      warn!(path = %file.display(), "Stored database was built with different index settings");
    }

    db.set_entries(stored.entries);
    Ok(())
  }

  fn save(&self, db: &Database, dir: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;

    let target = dir.join(DATABASE_FILE_NAME);
    let tmp = dir.join(format!("{}.tmp", DATABASE_FILE_NAME));
    let content = serde_json::to_vec(&DatabaseFileRef {
      version: FORMAT_VERSION,
      spec: db.spec(),
      entries: db.entries(),
    })
    .map_err(|e| EngineError::Corrupt {
      path: target.clone(),
      message: e.to_string(),
    })?;

    fs::write(&tmp, content).map_err(|e| EngineError::io(&tmp, e))?;
    fs::rename(&tmp, &target).map_err(|e| EngineError::io(&target, e))?;
    debug!(path = %target.display(), entries = db.num_entries(), "Database saved");
    Ok(())
  }
}

// ============================================================================
// Tests
// ============================================================================
