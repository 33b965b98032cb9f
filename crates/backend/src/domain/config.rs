//! Configuration for the database orchestrator.
//!
//! Read from `<config-dir>/fsearch/fsearch.toml`. Every section is
//! `#[serde(default)]` so partial files are fine.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};

use super::database::IndexSpec;

/// Lower bound for the auto-update period.
pub const MIN_AUTO_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Config file not found: {0:?}")]
  NotFound(PathBuf),
  #[error("Failed to read config {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Invalid config {path:?}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("Failed to serialize config: {0}")]
  Serialize(#[from] toml::ser::Error),
  #[error("Default configuration has no index location (home directory unknown)")]
  NoDefaultIndex,
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Indexing and update scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  /// Directories to index
  pub indexes: Vec<PathBuf>,

  /// Directories excluded from indexing (with everything below them)
  pub exclude_locations: Vec<PathBuf>,

  /// File name glob patterns to exclude (e.g. "*.o")
  pub exclude_files: Vec<String>,

  /// Skip hidden files and directories
  pub exclude_hidden_items: bool,

  /// Rescan right after the database is loaded at startup
  pub update_database_on_launch: bool,

  /// Periodically rescan in the background
  pub update_database_every: bool,

  pub update_database_every_hours: u32,

  pub update_database_every_minutes: u32,

  /// Forward engine progress text to observers
  pub show_indexing_status: bool,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      indexes: dirs::home_dir().into_iter().collect(),
      exclude_locations: Vec::new(),
      exclude_files: Vec::new(),
      exclude_hidden_items: false,
      update_database_on_launch: false,
      update_database_every: false,
      update_database_every_hours: 0,
      update_database_every_minutes: 15,
      show_indexing_status: true,
    }
  }
}

// ============================================================================
// Log Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  pub level: String,

  /// Log file rotation for the primary instance: "daily", "hourly", "never"
  pub rotation: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub database: DatabaseConfig,
  pub log: LogConfig,
}

/// Which parts of the configuration differ between two versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigDiff {
  /// Index locations or exclusion rules changed; the database must be rebuilt
  pub database_config_changed: bool,
  /// Auto-update schedule changed
  pub auto_update_changed: bool,
}

impl Config {
  /// Get the user-level config path
  pub fn user_config_path() -> PathBuf {
    crate::dirs::default_config_dir().join("fsearch.toml")
  }

  /// Load from an explicit file.
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = match std::fs::read_to_string(path) {
      Ok(c) => c,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ConfigError::NotFound(path.to_path_buf())),
      Err(source) => {
        return Err(ConfigError::Io {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load the user config file.
  pub fn load() -> Result<Self, ConfigError> {
    Self::load_from(&Self::user_config_path())
  }

  /// Built-in defaults, rejected when they would index nothing.
  pub fn load_default() -> Result<Self, ConfigError> {
    let config = Self::default();
    if config.database.indexes.is_empty() {
      return Err(ConfigError::NoDefaultIndex);
    }
    Ok(config)
  }

  /// Load `path` (or the user config), falling back to defaults.
  ///
  /// Only fails when the fallback defaults are unusable too.
  pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
    let loaded = match path {
      Some(path) => Self::load_from(path),
      None => Self::load(),
    };

    match loaded {
      Ok(config) => Ok(config),
      Err(ConfigError::NotFound(path)) => {
        tracing::debug!(?path, "No config file, using defaults");
        Self::load_default()
      }
      Err(e) => {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Self::load_default()
      }
    }
  }

  /// Write the config as TOML, creating the parent directory.
  pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(self)?;
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })
  }

  /// The part of the configuration a database snapshot is built from.
  pub fn index_spec(&self) -> IndexSpec {
    IndexSpec {
      index_paths: self.database.indexes.clone(),
      exclude_paths: self.database.exclude_locations.clone(),
      exclude_patterns: self.database.exclude_files.clone(),
      exclude_hidden: self.database.exclude_hidden_items,
    }
  }

  /// Period of the auto-update timer, or `None` when disabled.
  ///
  /// Never shorter than [`MIN_AUTO_UPDATE_INTERVAL`].
  pub fn auto_update_interval(&self) -> Option<Duration> {
    if !self.database.update_database_every {
      return None;
    }

    let secs = u64::from(self.database.update_database_every_hours) * 3600
      + u64::from(self.database.update_database_every_minutes) * 60;
    Some(Duration::from_secs(secs).max(MIN_AUTO_UPDATE_INTERVAL))
  }

  pub fn compare(&self, other: &Config) -> ConfigDiff {
    ConfigDiff {
      database_config_changed: self.index_spec() != other.index_spec(),
      auto_update_changed: self.auto_update_interval() != other.auto_update_interval(),
    }
  }
}

// ============================================================================
// Tests
// ============================================================================
