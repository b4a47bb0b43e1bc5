//! Lease-based distributed locks.
//!
//! A lock is a name root (`5<b64 name>` -> id), an info record
//! (`6<id>` -> `usage_expiry_pid_b64name`) and, while held, a marker
//! (`7<id>dl_lock`) whose substrate ttl equals the lease. A marker whose
//! recorded expiry has passed is stale and any contender may clear it.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::codec;
use crate::consts::{DEFAULT_LOCK_LEASE, DEFAULT_LOCK_WAIT, REMOVE_LOCK_LEASE, REMOVE_LOCK_WAIT};
use crate::dps::Dps;
use crate::error::{DpsError, Result};
use crate::mutex;

/// Decoded lock info record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
  pub usage: u32,
  /// Epoch seconds; zero while free.
  pub expiry: u64,
  /// Owner; zero while free.
  pub pid: u32,
  pub name: String,
}

impl LockInfo {
  fn free(name: &str) -> Self {
    Self {
      usage: 0,
      expiry: 0,
      pid: 0,
      name: name.to_string(),
    }
  }

  fn render(&self) -> String {
    format!(
      "{}_{}_{}_{}",
      self.usage,
      self.expiry,
      self.pid,
      codec::encode_base64(self.name.as_bytes())
    )
  }

  fn parse(raw: &[u8], key: &str) -> Result<Self> {
    let malformed = |reason: String| DpsError::MalformedMetadata {
      key: key.to_string(),
      reason,
    };
    let text = std::str::from_utf8(raw).map_err(|_| malformed("not utf-8".to_string()))?;
    let mut parts = text.splitn(4, '_');
    let mut field = || {
      parts
        .next()
        .ok_or_else(|| malformed(format!("expected 4 fields in {text:?}")))
    };
    let (usage, expiry, pid, name) = (field()?, field()?, field()?, field()?);

    let name = String::from_utf8(codec::decode_base64(name)?).map_err(|e| malformed(e.to_string()))?;
    Ok(Self {
      usage: usage.parse().map_err(|_| malformed(format!("bad usage {usage:?}")))?,
      expiry: expiry.parse().map_err(|_| malformed(format!("bad expiry {expiry:?}")))?,
      pid: pid.parse().map_err(|_| malformed(format!("bad pid {pid:?}")))?,
      name,
    })
  }

  pub fn is_held(&self) -> bool {
    self.usage > 0
  }
}

fn lease_secs(lease: Duration) -> u64 {
  lease.as_secs() + u64::from(lease.subsec_nanos() > 0)
}

impl Dps {
  /// Returns the id of the named lock, creating it if needed.
  pub fn create_or_get_lock(&self, name: &str) -> Result<u64> {
    let backend = self.backend.as_ref();
    let root = codec::lock_name_root(name.as_bytes());
    let _guard = mutex::lock_generic(backend, &root, &self.mutex)?;

    if let Some(raw) = backend.get(root.as_bytes())? {
      return codec::parse_id(&raw, &root);
    }

    let id = self.allocator.allocate(backend, &self.mutex)?;
    if let Err(e) = backend.set(root.as_bytes(), id.to_string().as_bytes(), None) {
      self.release_id(id);
      return Err(DpsError::write(e, "lock name root"));
    }

    let info = LockInfo::free(name);
    if let Err(e) = backend.set(codec::lock_info_key(id).as_bytes(), info.render().as_bytes(), None) {
      warn!(lock = id, name, error = %e, "lock creation failed, rolling back");
      self.rollback_root(&root);
      self.release_id(id);
      return Err(DpsError::write(e, "lock info"));
    }

    debug!(lock = id, name, "created lock");
    Ok(id)
  }

  pub fn lock_info(&self, lock: u64) -> Result<LockInfo> {
    let key = codec::lock_info_key(lock);
    let raw = self
      .backend
      .get(key.as_bytes())?
      .ok_or_else(|| DpsError::LockNotFound(format!("lock id {lock}")))?;
    LockInfo::parse(&raw, &key)
  }

  fn write_lock_info(&self, lock: u64, info: &LockInfo) -> Result<()> {
    self
      .backend
      .set(codec::lock_info_key(lock).as_bytes(), info.render().as_bytes(), None)
      .map_err(|e| DpsError::write(e, format_args!("lock {lock} info")))
  }

  /// Blocks until the lock is held, `max_wait` has elapsed, or the retry
  /// ceiling is reached.
  pub fn acquire_lock(&self, lock: u64, lease: Duration, max_wait: Duration) -> Result<()> {
    let mut info = self.lock_info(lock)?;
    let marker = codec::lock_marker_key(lock);
    let pid = self.identity.pid.to_string();
    let started = Instant::now();
    let mut retry = 0u32;

    loop {
      if self.backend.set_nx(marker.as_bytes(), pid.as_bytes(), Some(lease))? {
        info.usage = 1;
        info.expiry = self.clock.now_secs() + lease_secs(lease);
        info.pid = self.identity.pid;
        match self.write_lock_info(lock, &info) {
          Ok(()) => {
            debug!(lock, retry, expiry = info.expiry, "acquired lock");
            return Ok(());
          }
          Err(e) => {
            warn!(lock, error = %e, "could not record lock owner, letting go");
            self.backend.del(marker.as_bytes())?;
          }
        }
      } else if let Ok(current) = self.lock_info(lock)
        && current.expiry > 0
        && self.clock.now_secs() > current.expiry
      {
        self.reclaim_expired(lock, &current)?;
      }

      retry += 1;
      if retry >= self.mutex.max_retry {
        return Err(DpsError::LockAcquisitionFailed { id: lock, attempts: retry });
      }
      let waited = started.elapsed();
      if waited > max_wait {
        return Err(DpsError::LockAcquisitionTimeout {
          id: lock,
          waited_ms: waited.as_millis(),
        });
      }
      thread::sleep(self.mutex.backoff(retry));
    }
  }

  /// Clears a marker left by an owner whose lease has run out. Skips the
  /// release when the marker or info record has moved on since `stale` was
  /// read, so a contender that already took over keeps the lock.
  fn reclaim_expired(&self, lock: u64, stale: &LockInfo) -> Result<()> {
    let marker = codec::lock_marker_key(lock);
    let owner = self.backend.get(marker.as_bytes())?;
    if owner.as_deref() != Some(stale.pid.to_string().as_bytes()) {
      debug!(lock, stale_owner = stale.pid, "lock changed hands before reclaim");
      return Ok(());
    }
    if self.lock_info(lock)? != *stale {
      debug!(lock, stale_owner = stale.pid, "lock info changed before reclaim");
      return Ok(());
    }
    warn!(lock, owner = stale.pid, expiry = stale.expiry, "reclaiming expired lock");
    self.release_lock(lock)
  }

  /// Acquires with a ten year lease and a 15 second wait.
  pub fn acquire_lock_default(&self, lock: u64) -> Result<()> {
    self.acquire_lock(lock, DEFAULT_LOCK_LEASE, DEFAULT_LOCK_WAIT)
  }

  /// Deletes the marker and marks the lock free. Releasing a free lock is
  /// a no-op.
  pub fn release_lock(&self, lock: u64) -> Result<()> {
    let info = self.lock_info(lock)?;
    self.backend.del(codec::lock_marker_key(lock).as_bytes())?;
    self.write_lock_info(lock, &LockInfo::free(&info.name))?;
    debug!(lock, "released lock");
    Ok(())
  }

  /// Removes a lock nobody holds. Waits briefly for a holder to let go.
  pub fn remove_lock(&self, lock: u64) -> Result<()> {
    self.acquire_lock(lock, REMOVE_LOCK_LEASE, REMOVE_LOCK_WAIT)?;
    let marker = codec::lock_marker_key(lock);

    let info = match self.lock_info(lock) {
      Ok(info) => info,
      Err(e) => {
        if let Err(cleanup) = self.backend.del(marker.as_bytes()) {
          warn!(lock, key = %marker, error = %cleanup, "failed to drop lock marker");
        }
        return Err(e);
      }
    };

    let removed = self
      .backend
      .del(codec::lock_info_key(lock).as_bytes())
      .and_then(|_| self.backend.del(codec::lock_name_root(info.name.as_bytes()).as_bytes()));
    self.backend.del(marker.as_bytes())?;
    removed?;

    self.release_id(lock);
    debug!(lock, name = %info.name, "removed lock");
    Ok(())
  }

  /// Id of an existing lock. Unlike [`Dps::create_or_get_lock`] this never
  /// creates one.
  pub fn find_lock(&self, name: &str) -> Result<u64> {
    let root = codec::lock_name_root(name.as_bytes());
    let raw = self
      .backend
      .get(root.as_bytes())?
      .ok_or_else(|| DpsError::LockNotFound(name.to_string()))?;
    codec::parse_id(&raw, &root)
  }

  /// Pid of the last owner of the named lock, zero if never acquired.
  pub fn get_pid_for_lock(&self, name: &str) -> Result<u32> {
    let id = self.find_lock(name)?;
    Ok(self.lock_info(id)?.pid)
  }

  /// Handle to the named lock, created on first use.
  pub fn lock(&self, name: &str) -> Result<LockHandle<'_>> {
    let id = self.create_or_get_lock(name)?;
    Ok(LockHandle { dps: self, id })
  }
}

/// A named lock bound to a [`Dps`]. Does not release on drop; leases do
/// that for a holder that goes away.
#[derive(Debug, Clone, Copy)]
pub struct LockHandle<'a> {
  dps: &'a Dps,
  id: u64,
}

impl LockHandle<'_> {
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn acquire(&self) -> Result<()> {
    self.dps.acquire_lock_default(self.id)
  }

  pub fn acquire_with(&self, lease: Duration, max_wait: Duration) -> Result<()> {
    self.dps.acquire_lock(self.id, lease, max_wait)
  }

  pub fn release(&self) -> Result<()> {
    self.dps.release_lock(self.id)
  }

  pub fn info(&self) -> Result<LockInfo> {
    self.dps.lock_info(self.id)
  }
}
