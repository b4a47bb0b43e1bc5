//! Test utilities for dps-lib.
//!
//! [`FaultyBackend`] wraps a [`MemoryBackend`] and fails chosen primitives
//! on chosen keys, so tests can interrupt a multi-step operation at one
//! exact point.

use std::sync::Mutex;
use std::time::Duration;

use crate::backend::{
  BackendError, BackendResult, ContainerCapability, KvBackend, MapPrimitives, MemoryBackend, ScanPrimitives,
};

#[derive(Debug)]
struct Fault {
  op: &'static str,
  prefix: Vec<u8>,
  remaining: u32,
}

/// Memory substrate that answers selected calls with a connection error.
///
/// Faults match on the primitive name (`set`, `del`, `append`, `map_set`,
/// `record_put`, ...) and a key prefix. For record primitives the prefix is
/// matched against the container name.
#[derive(Debug)]
pub struct FaultyBackend {
  inner: MemoryBackend,
  faults: Mutex<Vec<Fault>>,
}

impl FaultyBackend {
  pub fn new(capability: ContainerCapability) -> Self {
    Self::wrap(MemoryBackend::new(capability))
  }

  pub fn wrap(inner: MemoryBackend) -> Self {
    Self {
      inner,
      faults: Mutex::new(Vec::new()),
    }
  }

  pub fn inner(&self) -> &MemoryBackend {
    &self.inner
  }

  /// Fails the next `times` calls of `op` on keys starting with `prefix`.
  pub fn fail(&self, op: &'static str, prefix: impl AsRef<[u8]>, times: u32) {
    self.faults.lock().unwrap().push(Fault {
      op,
      prefix: prefix.as_ref().to_vec(),
      remaining: times,
    });
  }

  fn trip(&self, op: &'static str, key: &[u8]) -> BackendResult<()> {
    let mut faults = self.faults.lock().unwrap();
    if let Some(fault) = faults
      .iter_mut()
      .find(|f| f.op == op && f.remaining > 0 && key.starts_with(&f.prefix))
    {
      fault.remaining -= 1;
      return Err(BackendError::Connection("socket reset".to_string()));
    }
    Ok(())
  }
}

impl KvBackend for FaultyBackend {
  fn product_name(&self) -> &str {
    "faulty"
  }

  fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    self.trip("get", key)?;
    self.inner.get(key)
  }

  fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<()> {
    self.trip("set", key)?;
    self.inner.set(key, value, ttl)
  }

  fn set_nx(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<bool> {
    self.trip("set_nx", key)?;
    self.inner.set_nx(key, value, ttl)
  }

  fn expire(&self, key: &[u8], ttl: Duration) -> BackendResult<bool> {
    self.trip("expire", key)?;
    self.inner.expire(key, ttl)
  }

  fn append(&self, key: &[u8], value: &[u8]) -> BackendResult<bool> {
    self.trip("append", key)?;
    self.inner.append(key, value)
  }

  fn incr(&self, key: &[u8]) -> BackendResult<u64> {
    self.trip("incr", key)?;
    self.inner.incr(key)
  }

  fn del(&self, key: &[u8]) -> BackendResult<bool> {
    self.trip("del", key)?;
    self.inner.del(key)
  }

  fn exists(&self, key: &[u8]) -> BackendResult<bool> {
    self.trip("exists", key)?;
    self.inner.exists(key)
  }

  fn capability(&self) -> ContainerCapability {
    self.inner.capability()
  }

  fn as_map(&self) -> Option<&dyn MapPrimitives> {
    self.inner.as_map().map(|_| self as &dyn MapPrimitives)
  }

  fn as_scan(&self) -> Option<&dyn ScanPrimitives> {
    self.inner.as_scan().map(|_| self as &dyn ScanPrimitives)
  }

  fn reconnect(&self) -> BackendResult<()> {
    self.inner.reconnect()
  }

  fn is_connected(&self) -> bool {
    self.inner.is_connected()
  }
}

impl MapPrimitives for FaultyBackend {
  fn map_get(&self, key: &[u8], field: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    self.trip("map_get", key)?;
    self.inner.map_get(key, field)
  }

  fn map_set(&self, key: &[u8], field: &[u8], value: &[u8]) -> BackendResult<()> {
    self.trip("map_set", key)?;
    self.inner.map_set(key, field, value)
  }

  fn map_delete(&self, key: &[u8], field: &[u8]) -> BackendResult<bool> {
    self.trip("map_delete", key)?;
    self.inner.map_delete(key, field)
  }

  fn map_keys(&self, key: &[u8]) -> BackendResult<Vec<Vec<u8>>> {
    self.trip("map_keys", key)?;
    self.inner.map_keys(key)
  }

  fn map_len(&self, key: &[u8]) -> BackendResult<u64> {
    self.trip("map_len", key)?;
    self.inner.map_len(key)
  }

  fn map_exists(&self, key: &[u8], field: &[u8]) -> BackendResult<bool> {
    self.trip("map_exists", key)?;
    self.inner.map_exists(key, field)
  }
}

impl ScanPrimitives for FaultyBackend {
  fn container_budget(&self) -> u32 {
    self.inner.container_budget()
  }

  fn record_get(&self, container: &str, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    self.trip("record_get", container.as_bytes())?;
    self.inner.record_get(container, key)
  }

  fn record_put(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<()> {
    self.trip("record_put", container.as_bytes())?;
    self.inner.record_put(container, key, value)
  }

  fn record_create(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<bool> {
    self.trip("record_create", container.as_bytes())?;
    self.inner.record_create(container, key, value)
  }

  fn record_delete(&self, container: &str, key: &[u8]) -> BackendResult<bool> {
    self.trip("record_delete", container.as_bytes())?;
    self.inner.record_delete(container, key)
  }

  fn record_exists(&self, container: &str, key: &[u8]) -> BackendResult<bool> {
    self.trip("record_exists", container.as_bytes())?;
    self.inner.record_exists(container, key)
  }

  fn scan(&self, container: &str, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> BackendResult<()> {
    self.trip("scan", container.as_bytes())?;
    self.inner.scan(container, visit)
  }
}
