use std::path::PathBuf;

/// Get the directory holding the per-user bus sockets
///
/// Respects the following environment variables (in order of precedence):
/// 1. FSEARCH_BUS_DIR - explicit bus directory override
/// 2. XDG_RUNTIME_DIR - standard XDG runtime directory
/// 3. /tmp/fsearch-<uid>
pub fn default_bus_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("FSEARCH_BUS_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
    return PathBuf::from(runtime_dir).join("fsearch");
  }

  let uid = unsafe { libc::getuid() };
  PathBuf::from(format!("/tmp/fsearch-{}", uid))
}

/// Get the default data directory (database file, logs)
///
/// Respects the following environment variables (in order of precedence):
/// 1. FSEARCH_DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_dir() - platform default
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("FSEARCH_DATA_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join("fsearch");
  }

  dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("fsearch")
}

/// Get the default config directory
///
/// Respects the following environment variables (in order of precedence):
/// 1. FSEARCH_CONFIG_DIR - explicit config directory override
/// 2. XDG_CONFIG_HOME - standard XDG config home directory
/// 3. dirs::config_dir() - platform default
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("FSEARCH_CONFIG_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join("fsearch");
  }

  dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("fsearch")
}

/// Directory for the primary instance's rolling log files
pub fn default_log_dir() -> PathBuf {
  default_data_dir().join("logs")
}
