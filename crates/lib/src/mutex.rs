//! Transient mutexes built from a SETNX marker with a ttl.
//!
//! The marker's ttl bounds how long a crashed holder can block others.
//! Guards delete their marker on drop, so every exit path releases.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::KvBackend;
use crate::codec;
use crate::consts::{MUTEX_MAX_RETRY, MUTEX_SLEEP, MUTEX_TTL};
use crate::error::{DpsError, Result};

/// Retry behaviour shared by the generic and store mutexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexSettings {
  pub ttl: Duration,
  pub sleep: Duration,
  pub max_retry: u32,
}

impl Default for MutexSettings {
  fn default() -> Self {
    Self {
      ttl: MUTEX_TTL,
      sleep: MUTEX_SLEEP,
      max_retry: MUTEX_MAX_RETRY,
    }
  }
}

impl MutexSettings {
  /// Back-off before the next attempt: `sleep * (retry % (max_retry / 100))`.
  pub fn backoff(&self, retry: u32) -> Duration {
    let cycle = (self.max_retry / 100).max(1);
    self.sleep * (retry % cycle)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutexKind {
  Generic,
  Store(u64),
}

/// A held mutex. Dropping it deletes the marker.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
  backend: &'a dyn KvBackend,
  key: String,
  kind: MutexKind,
}

impl std::fmt::Debug for MutexGuard<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MutexGuard").field("key", &self.key).field("kind", &self.kind).finish()
  }
}

impl MutexGuard<'_> {
  pub fn key(&self) -> &str {
    &self.key
  }
}

impl Drop for MutexGuard<'_> {
  fn drop(&mut self) {
    if let Err(e) = self.backend.del(self.key.as_bytes()) {
      // The marker ttl cleans up after us.
      warn!(key = %self.key, error = %e, "failed to release mutex");
    }
  }
}

/// General-purpose mutex keyed by an arbitrary entity name.
pub fn lock_generic<'a>(backend: &'a dyn KvBackend, entity: &str, settings: &MutexSettings) -> Result<MutexGuard<'a>> {
  let key = codec::generic_mutex_key(entity);
  if acquire_marker(backend, &key, settings)? {
    return Ok(MutexGuard {
      backend,
      key,
      kind: MutexKind::Generic,
    });
  }
  Err(DpsError::GenericMutex(entity.to_string()))
}

/// Mutex scoped to one store, taken around put, remove and clear.
pub fn lock_store<'a>(backend: &'a dyn KvBackend, store: u64, settings: &MutexSettings) -> Result<MutexGuard<'a>> {
  let key = codec::store_mutex_key(store);
  if acquire_marker(backend, &key, settings)? {
    return Ok(MutexGuard {
      backend,
      key,
      kind: MutexKind::Store(store),
    });
  }
  Err(DpsError::StoreMutex(store))
}

/// Returns false once the retry ceiling is reached. Connection errors are
/// returned immediately. The marker is created with its ttl in one step,
/// so no failure leaves it without one.
fn acquire_marker(backend: &dyn KvBackend, key: &str, settings: &MutexSettings) -> Result<bool> {
  let mut retry = 0;
  loop {
    if backend.set_nx(key.as_bytes(), b"1", Some(settings.ttl))? {
      if retry > 0 {
        debug!(key, retry, "mutex acquired after contention");
      }
      return Ok(true);
    }

    retry += 1;
    if retry >= settings.max_retry {
      warn!(key, retry, "giving up on mutex");
      return Ok(false);
    }
    thread::sleep(settings.backoff(retry));
  }
}
