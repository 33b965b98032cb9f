//! Well-known name ownership.
//!
//! Binding `<name>.sock` succeeds for exactly one process. A socket file left
//! behind by a crashed owner refuses connections; it is removed and the bind
//! retried once.

use std::{io::ErrorKind, path::PathBuf, time::Duration};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use super::{BusConfig, BusError};

/// Connection attempts before a socket is considered stale. Covers the window
/// between another owner's bind() and listen().
const PROBE_ATTEMPTS: usize = 3;
const PROBE_DELAY: Duration = Duration::from_millis(20);

/// Result of trying to own a name
#[derive(Debug)]
pub enum Acquisition {
  Owned(NameOwner),
  /// Another live process owns the name
  Taken,
}

/// Holds a bus name until dropped.
#[derive(Debug)]
pub struct NameOwner {
  name: String,
  path: PathBuf,
  listener: Option<UnixListener>,
}

impl NameOwner {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn path(&self) -> &std::path::Path {
    &self.path
  }

  pub(crate) fn listener(&self) -> Option<&UnixListener> {
    self.listener.as_ref()
  }
}

impl Drop for NameOwner {
  fn drop(&mut self) {
    // Close before unlinking so a racing acquirer can't see a live socket file
    // with nobody behind it
    self.listener.take();
    if let Err(e) = std::fs::remove_file(&self.path)
      && e.kind() != ErrorKind::NotFound
    {
      debug!(path = %self.path.display(), error = %e, "Failed to remove bus socket");
    }
    debug!(name = %self.name, "Released bus name");
  }
}

/// Try to become the owner of `name`.
pub async fn acquire(bus: &BusConfig, name: &str) -> Result<Acquisition, BusError> {
  tokio::fs::create_dir_all(&bus.dir).await?;
  let path = bus.socket_path(name);

  for attempt in 0..2 {
    match UnixListener::bind(&path) {
      Ok(listener) => {
        debug!(name, path = %path.display(), "Acquired bus name");
        return Ok(Acquisition::Owned(NameOwner {
          name: name.to_string(),
          path,
          listener: Some(listener),
        }));
      }
      Err(e) if e.kind() == ErrorKind::AddrInUse => {
        if is_live(&path).await {
          return Ok(Acquisition::Taken);
        }
        if attempt == 0 {
          info!(name, path = %path.display(), "Removing stale bus socket");
          match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
          }
        }
      }
      Err(e) => return Err(e.into()),
    }
  }

  // Lost the race for the reclaimed socket
  Ok(Acquisition::Taken)
}

/// Whether some process currently owns `name`.
pub async fn is_owned(bus: &BusConfig, name: &str) -> bool {
  is_live(&bus.socket_path(name)).await
}

async fn is_live(path: &std::path::Path) -> bool {
  for attempt in 0..PROBE_ATTEMPTS {
    match UnixStream::connect(path).await {
      Ok(_) => return true,
      Err(e) if e.kind() == ErrorKind::NotFound => return false,
      Err(_) if attempt + 1 < PROBE_ATTEMPTS => tokio::time::sleep(PROBE_DELAY).await,
      Err(_) => {}
    }
  }
  false
}
