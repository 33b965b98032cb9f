use std::{path::Path, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::trace;

use super::{BusConfig, BusError, BusRequest, BusResponse, Request, Response};

/// Client for a single bus name. One request in flight at a time.
pub struct BusClient {
  framed: Framed<UnixStream, LinesCodec>,
  next_id: u64,
}

impl BusClient {
  pub async fn connect(path: &Path) -> Result<Self, BusError> {
    let stream = UnixStream::connect(path)
      .await
      .map_err(|e| BusError::Connection(e.to_string()))?;
    Ok(Self {
      framed: Framed::new(stream, LinesCodec::new()),
      next_id: 1,
    })
  }

  /// Connect to a well-known name on `bus`.
  pub async fn connect_name(bus: &BusConfig, name: &str) -> Result<Self, BusError> {
    Self::connect(&bus.socket_path(name)).await
  }

  /// Send a request and wait for its response.
  pub async fn call(&mut self, request: BusRequest) -> Result<BusResponse, BusError> {
    let id = self.next_id;
    self.next_id += 1;

    let json = serde_json::to_string(&Request { id, request })?;
    trace!(id, "Sending bus request");
    self.framed.send(json).await?;

    loop {
      let line = match self.framed.next().await {
        Some(line) => line?,
        None => return Err(BusError::Connection("connection closed".into())),
      };
      let response: Response = serde_json::from_str(&line)?;
      // Responses to earlier timed-out calls may still arrive
      if response.id != id && response.id != 0 {
        trace!(expected = id, got = response.id, "Skipping stale response");
        continue;
      }
      return response.into_result();
    }
  }

  /// Like [`call`](Self::call) with an upper bound on the wait.
  pub async fn call_timeout(&mut self, request: BusRequest, timeout: Duration) -> Result<BusResponse, BusError> {
    tokio::time::timeout(timeout, self.call(request))
      .await
      .map_err(|_| BusError::Timeout)?
  }
}
