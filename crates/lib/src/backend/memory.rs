//! Process-local substrate.
//!
//! Every handle created with [`MemoryBackend::handle`] talks to the same
//! state, which is how tests stand in for several processes sharing one
//! server. A fault switch simulates the server going away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::state::SubstrateState;
use super::{BackendError, BackendResult, ContainerCapability, KvBackend, MapPrimitives, ScanPrimitives};
use crate::clock::{Clock, SystemClock};
use crate::consts::DEFAULT_CONTAINER_BUDGET;

#[derive(Debug)]
struct Shared {
  state: Mutex<SubstrateState>,
  faulted: AtomicBool,
  clock: Arc<dyn Clock>,
  capability: ContainerCapability,
  container_budget: u32,
}

#[derive(Debug)]
pub struct MemoryBackend {
  shared: Arc<Shared>,
  connected: AtomicBool,
}

impl MemoryBackend {
  pub fn new(capability: ContainerCapability) -> Self {
    Self::with_clock(capability, Arc::new(SystemClock))
  }

  pub fn with_clock(capability: ContainerCapability, clock: Arc<dyn Clock>) -> Self {
    Self::with_options(capability, clock, DEFAULT_CONTAINER_BUDGET)
  }

  pub fn with_options(capability: ContainerCapability, clock: Arc<dyn Clock>, container_budget: u32) -> Self {
    Self {
      shared: Arc::new(Shared {
        state: Mutex::new(SubstrateState::default()),
        faulted: AtomicBool::new(false),
        clock,
        capability,
        container_budget,
      }),
      connected: AtomicBool::new(true),
    }
  }

  /// A new connection to the same substrate.
  pub fn handle(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
      connected: AtomicBool::new(true),
    }
  }

  /// While set, every op on every handle fails with a connection error.
  /// Handles stay disconnected after the fault clears until they reconnect.
  pub fn set_fault(&self, faulted: bool) {
    debug!(faulted, "memory substrate fault switch");
    self.shared.faulted.store(faulted, Ordering::SeqCst);
  }

  fn state(&self) -> BackendResult<MutexGuard<'_, SubstrateState>> {
    if self.shared.faulted.load(Ordering::SeqCst) {
      self.connected.store(false, Ordering::SeqCst);
      return Err(BackendError::Connection("substrate unreachable".to_string()));
    }
    if !self.connected.load(Ordering::SeqCst) {
      return Err(BackendError::Connection("not connected".to_string()));
    }
    Ok(self.shared.state.lock().unwrap_or_else(PoisonError::into_inner))
  }

  fn now_ms(&self) -> u64 {
    self.shared.clock.now_millis()
  }
}

fn ttl_ms(ttl: Option<Duration>) -> Option<u64> {
  ttl.map(|t| t.as_millis() as u64)
}

impl KvBackend for MemoryBackend {
  fn product_name(&self) -> &str {
    "memory"
  }

  fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    let now = self.now_ms();
    self.state()?.get(key, now)
  }

  fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<()> {
    let now = self.now_ms();
    self.state()?.set(key, value, ttl_ms(ttl), now);
    Ok(())
  }

  fn set_nx(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> BackendResult<bool> {
    let now = self.now_ms();
    Ok(self.state()?.set_nx(key, value, ttl_ms(ttl), now))
  }

  fn expire(&self, key: &[u8], ttl: Duration) -> BackendResult<bool> {
    let now = self.now_ms();
    Ok(self.state()?.expire(key, ttl.as_millis() as u64, now))
  }

  fn append(&self, key: &[u8], value: &[u8]) -> BackendResult<bool> {
    let now = self.now_ms();
    self.state()?.append(key, value, now)
  }

  fn incr(&self, key: &[u8]) -> BackendResult<u64> {
    let now = self.now_ms();
    self.state()?.incr(key, now)
  }

  fn del(&self, key: &[u8]) -> BackendResult<bool> {
    let now = self.now_ms();
    Ok(self.state()?.del(key, now))
  }

  fn exists(&self, key: &[u8]) -> BackendResult<bool> {
    let now = self.now_ms();
    Ok(self.state()?.exists(key, now))
  }

  fn capability(&self) -> ContainerCapability {
    self.shared.capability
  }

  fn as_map(&self) -> Option<&dyn MapPrimitives> {
    (self.shared.capability == ContainerCapability::NativeMap).then_some(self as &dyn MapPrimitives)
  }

  fn as_scan(&self) -> Option<&dyn ScanPrimitives> {
    (self.shared.capability == ContainerCapability::Scan).then_some(self as &dyn ScanPrimitives)
  }

  fn reconnect(&self) -> BackendResult<()> {
    if self.shared.faulted.load(Ordering::SeqCst) {
      return Err(BackendError::Connection("substrate unreachable".to_string()));
    }
    self.connected.store(true, Ordering::SeqCst);
    Ok(())
  }

  fn is_connected(&self) -> bool {
    self.connected.load(Ordering::SeqCst) && !self.shared.faulted.load(Ordering::SeqCst)
  }
}

impl MapPrimitives for MemoryBackend {
  fn map_get(&self, key: &[u8], field: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    let now = self.now_ms();
    self.state()?.map_get(key, field, now)
  }

  fn map_set(&self, key: &[u8], field: &[u8], value: &[u8]) -> BackendResult<()> {
    let now = self.now_ms();
    self.state()?.map_set(key, field, value, now)
  }

  fn map_delete(&self, key: &[u8], field: &[u8]) -> BackendResult<bool> {
    let now = self.now_ms();
    self.state()?.map_delete(key, field, now)
  }

  fn map_keys(&self, key: &[u8]) -> BackendResult<Vec<Vec<u8>>> {
    let now = self.now_ms();
    self.state()?.map_keys(key, now)
  }

  fn map_len(&self, key: &[u8]) -> BackendResult<u64> {
    let now = self.now_ms();
    self.state()?.map_len(key, now)
  }

  fn map_exists(&self, key: &[u8], field: &[u8]) -> BackendResult<bool> {
    let now = self.now_ms();
    self.state()?.map_exists(key, field, now)
  }
}

impl ScanPrimitives for MemoryBackend {
  fn container_budget(&self) -> u32 {
    self.shared.container_budget
  }

  fn record_get(&self, container: &str, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
    Ok(self.state()?.record_get(container, key))
  }

  fn record_put(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<()> {
    let budget = self.shared.container_budget;
    self.state()?.record_put(container, key, value, budget)
  }

  fn record_create(&self, container: &str, key: &[u8], value: &[u8]) -> BackendResult<bool> {
    let budget = self.shared.container_budget;
    self.state()?.record_create(container, key, value, budget)
  }

  fn record_delete(&self, container: &str, key: &[u8]) -> BackendResult<bool> {
    Ok(self.state()?.record_delete(container, key))
  }

  fn record_exists(&self, container: &str, key: &[u8]) -> BackendResult<bool> {
    Ok(self.state()?.record_exists(container, key))
  }

  fn scan(&self, container: &str, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> BackendResult<()> {
    // Visit outside the state lock so the callback may use this handle.
    let records = self.state()?.records(container);
    for (key, value) in &records {
      if !visit(key, value) {
        break;
      }
    }
    Ok(())
  }
}
