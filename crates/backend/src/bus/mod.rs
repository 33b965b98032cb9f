//! Per-user inter-process bus
//!
//! Each well-known name is a Unix socket `<bus-dir>/<name>.sock`. Owning a name
//! means holding the bound listener, so binding doubles as the election
//! primitive (see [`name::acquire`]). The wire protocol is newline-delimited
//! JSON, one request and one response per line.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod client;
pub mod name;
pub mod server;

pub use client::BusClient;
pub use name::{Acquisition, NameOwner};
pub use server::{BusHandler, BusServer};

use crate::state::DatabaseState;

/// Name owned by the primary (UI) instance
pub const PRIMARY_NAME: &str = "fsearch";

/// Name owned by the headless instance doing (or delegating) an update
pub const WORKER_NAME: &str = "fsearch-db-worker";

/// JSON-RPC style error codes
pub mod codes {
  pub const PARSE_ERROR: i32 = -32700;
  pub const UNKNOWN_ACTION: i32 = -32601;
}

#[derive(Debug, Clone)]
pub struct BusConfig {
  pub dir: PathBuf,
}

impl Default for BusConfig {
  fn default() -> Self {
    Self {
      dir: crate::dirs::default_bus_dir(),
    }
  }
}

impl BusConfig {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn socket_path(&self, name: &str) -> PathBuf {
    self.dir.join(format!("{}.sock", name))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum BusError {
  #[error("Ser/de error: {0}")]
  Serde(String),
  #[error("RPC error {code}: {message}")]
  Rpc { code: i32, message: String },
  #[error("No result in response")]
  NoResult,
  #[error("IO error: {0}")]
  Io(String),
  #[error("Connection error: {0}")]
  Connection(String),
  #[error("Codec error: {0}")]
  Codec(String),
  #[error("Request timed out")]
  Timeout,
  #[error("Bus shutdown")]
  Shutdown,
}

impl From<serde_json::Error> for BusError {
  fn from(err: serde_json::Error) -> Self {
    BusError::Serde(err.to_string())
  }
}

impl From<std::io::Error> for BusError {
  fn from(err: std::io::Error) -> Self {
    BusError::Io(err.to_string())
  }
}

impl From<tokio_util::codec::LinesCodecError> for BusError {
  fn from(err: tokio_util::codec::LinesCodecError) -> Self {
    BusError::Codec(err.to_string())
  }
}

impl BusError {
  pub fn rpc(code: i32, message: impl Into<String>) -> Self {
    BusError::Rpc {
      code,
      message: message.into(),
    }
  }
}

// ============================================================================
// Request envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
  pub id: u64,
  pub request: BusRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "params")]
pub enum BusRequest {
  /// List exported actions and whether they are enabled
  DescribeActions,
  /// Trigger a named action
  Activate(ActivateParams),
  /// Database state of the primary instance
  Status,
  /// Block until the name owner finishes its update
  AwaitCompletion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateParams {
  pub action: String,
}

// ============================================================================
// Response envelope
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
  pub id: u64,
  pub result: Option<BusResponse>,
  pub error: Option<BusError>,
}

impl Response {
  pub fn success(id: u64, result: BusResponse) -> Self {
    Self {
      id,
      result: Some(result),
      error: None,
    }
  }

  pub fn error(id: u64, error: BusError) -> Self {
    Self {
      id,
      result: None,
      error: Some(error),
    }
  }

  pub fn into_result(self) -> Result<BusResponse, BusError> {
    match (self.result, self.error) {
      (_, Some(error)) => Err(error),
      (Some(result), None) => Ok(result),
      (None, None) => Err(BusError::NoResult),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "params")]
pub enum BusResponse {
  Actions(Vec<ActionDescription>),
  Activated,
  Status(StatusInfo),
  Completed(CompletionInfo),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescription {
  pub name: String,
  pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
  pub db_state: DatabaseState,
  pub num_entries: usize,
  pub active_updates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionInfo {
  pub success: bool,
}
