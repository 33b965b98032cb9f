//! Bus server: serves requests on an owned name.
//!
//! Each connection runs in its own task. Requests on one connection are
//! answered in order; a handler may take as long as it needs (e.g.
//! `await_completion`).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::{
  codec::{Framed, LinesCodec},
  sync::CancellationToken,
  task::TaskTracker,
};
use tracing::{debug, error, info, trace, warn};

use super::{BusError, BusRequest, BusResponse, NameOwner, Request, Response, codes};

/// Grace period for open connections after the server is cancelled
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Answers bus requests for one name.
#[async_trait]
pub trait BusHandler: Send + Sync + 'static {
  async fn handle(&self, request: BusRequest) -> Result<BusResponse, BusError>;
}

pub struct BusServer {
  owner: NameOwner,
  handler: Arc<dyn BusHandler>,
  linger: Duration,
}

impl BusServer {
  pub fn new(owner: NameOwner, handler: Arc<dyn BusHandler>) -> Self {
    Self {
      owner,
      handler,
      linger: Duration::ZERO,
    }
  }

  /// Keep serving for `linger` after cancellation.
  ///
  /// During the linger the name stays owned, pending connections are still
  /// accepted, and connections that have not sent a request yet still get
  /// one answered.
  pub fn with_linger(mut self, linger: Duration) -> Self {
    self.linger = linger;
    self
  }

  fn spawn_connection(&self, tracker: &TaskTracker, stream: UnixStream, cancel: &CancellationToken) {
    let handler = Arc::clone(&self.handler);
    let cancel = cancel.clone();
    let linger = self.linger;
    tracker.spawn(async move {
      if let Err(e) = handle_connection(stream, handler, cancel, linger).await {
        debug!(error = %e, "Bus connection ended with error");
      }
    });
  }

  /// Serve until cancelled. The name is released when this returns.
  pub async fn run(self, cancel: CancellationToken) -> Result<(), BusError> {
    let Some(listener) = self.owner.listener() else {
      return Err(BusError::Shutdown);
    };
    info!(name = %self.owner.name(), path = %self.owner.path().display(), "Bus server listening");

    let tracker = TaskTracker::new();
    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          debug!(name = %self.owner.name(), "Bus server shutting down");
          break;
        }

        result = listener.accept() => {
          match result {
            Ok((stream, _)) => self.spawn_connection(&tracker, stream, &cancel),
            Err(e) => {
              error!("Accept error: {}", e);
            }
          }
        }
      }
    }

    // Clients that connected right before cancellation are still served
    if !self.linger.is_zero() {
      let deadline = tokio::time::Instant::now() + self.linger;
      while let Ok(result) = tokio::time::timeout_at(deadline, listener.accept()).await {
        match result {
          Ok((stream, _)) => self.spawn_connection(&tracker, stream, &cancel),
          Err(e) => error!("Accept error: {}", e),
        }
      }
    }

    tracker.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait()).await.is_err() {
      warn!(name = %self.owner.name(), "Bus connections still open at shutdown");
    }
    Ok(())
  }
}

/// Handle a single client connection.
///
/// - Parse errors return an error response but don't close the connection
/// - Handler errors return an error response but don't close the connection
/// - IO errors close the connection
async fn handle_connection(
  stream: UnixStream,
  handler: Arc<dyn BusHandler>,
  cancel: CancellationToken,
  linger: Duration,
) -> Result<(), BusError> {
  trace!("Bus client connected");
  let framed = Framed::new(stream, LinesCodec::new());
  let (mut sink, mut stream) = framed.split();

  loop {
    // Idle connections get `linger` to send one more request after shutdown;
    // an in-flight request is always answered
    let next = tokio::select! {
      biased;
      _ = cancel.cancelled() => match tokio::time::timeout(linger, stream.next()).await {
        Ok(next) => next,
        Err(_) => break,
      },
      next = stream.next() => next,
    };

    let line = match next {
      Some(Ok(l)) => l,
      Some(Err(e)) => {
        warn!(error = %e, "Error reading from bus client");
        break;
      }
      None => break,
    };

    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let request: Request = match serde_json::from_str(trimmed) {
      Ok(r) => r,
      Err(e) => {
        warn!("Invalid request JSON: {}", e);
        let response = Response::error(0, BusError::rpc(codes::PARSE_ERROR, format!("Parse error: {}", e)));
        sink.send(serde_json::to_string(&response)?).await?;
        continue;
      }
    };

    let start = std::time::Instant::now();
    trace!(id = request.id, method = ?request.request, "Processing bus request");

    let response = match handler.handle(request.request).await {
      Ok(result) => Response::success(request.id, result),
      Err(e) => Response::error(request.id, e),
    };
    sink.send(serde_json::to_string(&response)?).await?;

    debug!(id = request.id, elapsed_ms = start.elapsed().as_millis() as u64, "Bus request completed");
  }

  trace!("Bus client disconnected");
  Ok(())
}
