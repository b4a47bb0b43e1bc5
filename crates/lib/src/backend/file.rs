//! Substrate persisted as one JSON document in a data directory.
//!
//! Every primitive takes an advisory lock on `{dir}/.lock` for its whole
//! read-modify-write, shared for reads and exclusive for writes, so SETNX
//! and INCR stay atomic across OS processes.
//!
//! # Layout
//!
//! ```text
//! {data_dir}/
//! ├── .lock             # flock target, never contains data
//! └── substrate.json    # SubstrateState
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::state::{STATE_VERSION, SubstrateState};
use super::{BackendError, BackendResult, ContainerCapability, KvBackend, MapPrimitives, ScanPrimitives};
use crate::clock::{Clock, SystemClock};
use crate::consts::DEFAULT_CONTAINER_BUDGET;

const LOCK_FILENAME: &str = ".lock";
const STATE_FILENAME: &str = "substrate.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
  Shared,
  Exclusive,
}

/// Held for the duration of one primitive; released on drop.
struct DirLock {
  _file: File,
}

impl DirLock {
  fn acquire(dir: &Path, mode: LockMode) -> BackendResult<Self> {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(dir.join(LOCK_FILENAME))
      .map_err(|e| io_error("open lock file", e))?;

    lock(&file, mode).map_err(|e| io_error("lock data directory", e))?;
    Ok(DirLock { _file: file })
  }
}

fn io_error(action: &str, err: io::Error) -> BackendError {
  BackendError::Connection(format!("failed to {action}: {err}"))
}

#[derive(Debug, Clone)]
pub struct FileBackend {
  dir: PathBuf,
  capability: ContainerCapability,
  container_budget: u32,
  clock: Arc<dyn Clock>,
}

impl FileBackend {
  /// Opens (creating if needed) the substrate in `dir`.
  pub fn open(dir: impl Into<PathBuf>, capability: ContainerCapability) -> BackendResult<Self> {
    Self::with_options(dir, capability, DEFAULT_CONTAINER_BUDGET)
  }

  pub fn with_options(
    dir: impl Into<PathBuf>,
    capability: ContainerCapability,
    container_budget: u32,
  ) -> BackendResult<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir).map_err(|e| io_error("create data directory", e))?;
    debug!(dir = ?dir, %capability, "opened file substrate");
    Ok(Self {
      dir,
      capability,
      container_budget,
      clock: Arc::new(SystemClock),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn state_path(&self) -> PathBuf {
    self.dir.join(STATE_FILENAME)
  }

  fn load(&self) -> BackendResult<SubstrateState> {
    let content = match fs::read_to_string(self.state_path()) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SubstrateState::default()),
      Err(e) => return Err(io_error("read substrate", e)),
    };

    let state: SubstrateState =
      serde_json::from_str(&content).map_err(|e| BackendError::Malformed(format!("substrate file: {e}")))?;
    if state.version() != STATE_VERSION {
      return Err(BackendError::Malformed(format!(
        "unsupported substrate version {}",
        state.version()
      )));
    }
    Ok(state)
  }

  /// Write to a temp file in the same directory, then rename over.
  fn save(&self, state: &SubstrateState) -> BackendResult<()> {
    let content = serde_json::to_vec(state).map_err(|e| BackendError::Malformed(e.to_string()))?;
    let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| io_error("create temp file", e))?;
    temp.write_all(&content).map_err(|e| io_error("write substrate", e))?;
    temp
      .persist(self.state_path())
      .map_err(|e| io_error("replace substrate", e.error))?;
    Ok(())
  }

  fn read<T>(&self, f: impl FnOnce(&mut SubstrateState, u64) -> BackendResult<T>) -> BackendResult<T> {
    let _lock = DirLock::acquire(&self.dir, LockMode::Shared)?;
    let mut state = self.load()?;
    f(&mut state, self.clock.now_millis())
  }

  fn write<T>(&self, f: impl FnOnce(&mut SubstrateState, u64) -> BackendResult<T>) -> BackendResult<T> {
    let _lock = DirLock::acquire(&self.dir, LockMode::Exclusive)?;
    let mut state = self.load()?;
    let out = f(&mut state, self.clock.now_millis())?;
    self.save(&state)?;
    trace!(dir = ?self.dir, "substrate saved");
    Ok(out)
  }
}

fn ttl_ms(ttl: Option<Duration>) -> Option<u64> {
  ttl.map(|t| t.as_millis() as u64)
}

impl KvBackend for FileBackend {
  fn product_name(&self) -> &str {
    "file"
  }

  fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    self.read(|s, now| s.get(key, now))
  }

  fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<()> {
    self.write(|s, now| {
      s.set(key, value, ttl_ms(ttl), now);
      Ok(())
    })
  }

  fn set_nx(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<bool> {
    self.write(|s, now| Ok(s.set_nx(key, value, ttl_ms(ttl), now)))
  }

  fn expire(&self, key: &[u8], ttl: Duration) -> BackendResult<bool> {
    self.write(|s, now| Ok(s.expire(key, ttl.as_millis() as u64, now)))
  }

  fn append(&self, key: &[u8], value: &[u8]) -> BackendResult<bool> {
    self.write(|s, now| s.append(key, value, now))
  }

  fn incr(&self, key: &[u8]) -> BackendResult<u64> {
    self.write(|s, now| s.incr(key, now))
  }

  fn del(&self, key: &[u8]) -> BackendResult<bool> {
    self.write(|s, now| Ok(s.del(key, now)))
  }

  fn exists(&self, key: &[u8]) -> BackendResult<bool> {
    self.read(|s, now| Ok(s.exists(key, now)))
  }

  fn capability(&self) -> ContainerCapability {
    self.capability
  }

  fn as_map(&self) -> Option<&dyn MapPrimitives> {
    (self.capability == ContainerCapability::NativeMap).then_some(self as &dyn MapPrimitives)
  }

  fn as_scan(&self) -> Option<&dyn ScanPrimitives> {
    (self.capability == ContainerCapability::Scan).then_some(self as &dyn ScanPrimitives)
  }

  fn reconnect(&self) -> BackendResult<()> {
    fs::create_dir_all(&self.dir).map_err(|e| io_error("create data directory", e))
  }

  fn is_connected(&self) -> bool {
    self.dir.is_dir()
  }
}

impl MapPrimitives for FileBackend {
  fn map_get(&self, key: &[u8], field: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    self.read(|s, now| s.map_get(key, field, now))
  }

  fn map_set(&self, key: &[u8], field: &[u8], value: &[u8]) -> BackendResult<()> {
    self.write(|s, now| s.map_set(key, field, value, now))
  }

  fn map_delete(&self, key: &[u8], field: &[u8]) -> BackendResult<bool> {
    self.write(|s, now| s.map_delete(key, field, now))
  }

  fn map_keys(&self, key: &[u8]) -> BackendResult<Vec<Vec<u8>>> {
    self.read(|s, now| s.map_keys(key, now))
  }

  fn map_len(&self, key: &[u8]) -> BackendResult<u64> {
    self.read(|s, now| s.map_len(key, now))
  }

  fn map_exists(&self, key: &[u8], field: &[u8]) -> BackendResult<bool> {
    self.read(|s, now| s.map_exists(key, field, now))
  }
}

impl ScanPrimitives for FileBackend {
  fn container_budget(&self) -> u32 {
    self.container_budget
  }

  fn record_get(&self, container: &str, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    self.read(|s, _| Ok(s.record_get(container, key)))
  }

  fn record_put(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<()> {
    self.write(|s, _| s.record_put(container, key, value, self.container_budget))
  }

  fn record_create(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<bool> {
    self.write(|s, _| s.record_create(container, key, value, self.container_budget))
  }

  fn record_delete(&self, container: &str, key: &[u8]) -> BackendResult<bool> {
    self.write(|s, _| Ok(s.record_delete(container, key)))
  }

  fn record_exists(&self, container: &str, key: &[u8]) -> BackendResult<bool> {
    self.read(|s, _| Ok(s.record_exists(container, key)))
  }

  fn scan(&self, container: &str, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> BackendResult<()> {
    let records = self.read(|s, _| Ok(s.records(container)))?;
    for (key, value) in &records {
      if !visit(key, value) {
        break;
      }
    }
    Ok(())
  }
}

#[cfg(unix)]
fn lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::LockShared,
    LockMode::Exclusive => FlockOperation::LockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => 0,
    LockMode::Exclusive => LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is valid when zero-initialized and the handle is open.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
