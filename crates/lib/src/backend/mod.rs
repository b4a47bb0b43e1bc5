//! The key-value primitive boundary every substrate implements.
//!
//! The op-set is small: GET, SET, SETNX, EXPIRE, APPEND, INCR,
//! DEL and EXISTS on flat keys, plus exactly one container capability. The
//! protocol layer above never retries a failed primitive; callers decide
//! whether to [`KvBackend::reconnect`].

mod file;
mod memory;
mod state;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileBackend;
pub use memory::MemoryBackend;

#[derive(Debug, Error)]
pub enum BackendError {
  #[error("connection lost: {0}")]
  Connection(String),

  #[error("malformed reply: {0}")]
  Malformed(String),

  #[error("container budget of {budget} exhausted")]
  ContainerBudgetExhausted { budget: u32 },

  #[error("operation {0} is not offered by this substrate")]
  Unsupported(&'static str),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Which container primitive the substrate offers on top of flat keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerCapability {
  /// GET/SET/APPEND only. Stores use segmented catalogs.
  #[serde(alias = "segmented")]
  Flat,
  /// A native associative map per key.
  NativeMap,
  /// Bulk scan over a bounded number of containers.
  Scan,
}

impl ContainerCapability {
  pub const fn as_str(&self) -> &'static str {
    match self {
      ContainerCapability::Flat => "flat",
      ContainerCapability::NativeMap => "native-map",
      ContainerCapability::Scan => "scan",
    }
  }
}

impl fmt::Display for ContainerCapability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

pub trait KvBackend: Send + Sync {
  /// Short product name, e.g. `memory` or `file`.
  fn product_name(&self) -> &str;

  fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>>;

  /// Overwrites `key`. `ttl` of `None` means the entry never expires.
  fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<()>;

  /// Sets `key` only if absent. Returns whether this call created it.
  fn set_nx(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<bool>;

  /// Attaches a ttl to an existing key. Returns false if the key is absent.
  fn expire(&self, key: &[u8], ttl: Duration) -> BackendResult<bool>;

  /// Appends to an existing value. Returns false, writing nothing, if the
  /// key is absent.
  fn append(&self, key: &[u8], value: &[u8]) -> BackendResult<bool>;

  /// Increments the decimal counter at `key`, creating it at zero first.
  /// Returns the post-increment value.
  fn incr(&self, key: &[u8]) -> BackendResult<u64>;

  fn del(&self, key: &[u8]) -> BackendResult<bool>;

  fn exists(&self, key: &[u8]) -> BackendResult<bool>;

  fn capability(&self) -> ContainerCapability;

  fn as_map(&self) -> Option<&dyn MapPrimitives> {
    None
  }

  fn as_scan(&self) -> Option<&dyn ScanPrimitives> {
    None
  }

  fn reconnect(&self) -> BackendResult<()>;

  fn is_connected(&self) -> bool;
}

/// Native associative-map container, one map per key.
pub trait MapPrimitives {
  fn map_get(&self, key: &[u8], field: &[u8]) -> BackendResult<Option<Vec<u8>>>;

  fn map_set(&self, key: &[u8], field: &[u8], value: &[u8]) -> BackendResult<()>;

  fn map_delete(&self, key: &[u8], field: &[u8]) -> BackendResult<bool>;

  fn map_keys(&self, key: &[u8]) -> BackendResult<Vec<Vec<u8>>>;

  /// Field count, zero when the map does not exist.
  fn map_len(&self, key: &[u8]) -> BackendResult<u64>;

  fn map_exists(&self, key: &[u8], field: &[u8]) -> BackendResult<bool>;
}

/// Record containers that can only be enumerated with a full scan.
///
/// Containers spring into existence on their first record and are never
/// dropped, so the substrate caps how many may ever be created.
pub trait ScanPrimitives {
  fn container_budget(&self) -> u32;

  fn record_get(&self, container: &str, key: &[u8]) -> BackendResult<Option<Vec<u8>>>;

  fn record_put(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<()>;

  /// Writes only if the record is absent. Returns whether it was written.
  fn record_create(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<bool>;

  fn record_delete(&self, container: &str, key: &[u8]) -> BackendResult<bool>;

  fn record_exists(&self, container: &str, key: &[u8]) -> BackendResult<bool>;

  /// Calls `visit` for every record until it returns false.
  fn scan(&self, container: &str, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> BackendResult<()>;
}
