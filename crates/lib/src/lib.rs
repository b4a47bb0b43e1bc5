//! dps-lib: a distributed process store over a key-value substrate
//!
//! Named stores, named locks and a TTL area shared by any number of
//! processes, with all state kept in the substrate:
//! - `backend`: the KV adapter and the in-process and file substrates
//! - `container`: the per-store layouts (flat catalog, native map, scan)
//! - `Dps`: store directory, store operations, locks and the TTL area

pub mod alloc;
pub mod backend;
pub mod clock;
pub mod codec;
pub mod config;
pub mod consts;
pub mod container;
mod directory;
mod dps;
pub mod error;
pub mod iter;
pub mod lock;
pub mod mutex;
pub mod paths;
mod store;
pub mod ttl;

#[cfg(test)]
pub mod testutil;

pub use backend::{BackendError, ContainerCapability, FileBackend, KvBackend, MemoryBackend};
pub use config::{ConfigError, DpsConfig};
pub use container::StoreMetadata;
pub use dps::{Dps, DpsOptions};
pub use error::{DpsError, Result};
pub use iter::StoreIterator;
pub use lock::{LockHandle, LockInfo};
pub use ttl::{KeyForm, ValueForm};
