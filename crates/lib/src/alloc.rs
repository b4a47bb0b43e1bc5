//! Atomic id allocation for stores and locks.
//!
//! Counter mode draws from one shared INCR counter. Slot-pool mode hands
//! out indexes from a fixed tracker table for substrates that cap how many
//! containers may ever exist, so ids must be recycled.

use tracing::{debug, warn};

use crate::backend::{ContainerCapability, KvBackend, ScanPrimitives};
use crate::consts::{GUID_KEY, SLOT_ALLOCATION_MUTEX, STORE_ID_TRACKER_CONTAINER};
use crate::error::{DpsError, Result};
use crate::mutex::{self, MutexSettings};

const SLOT_FREE: &[u8] = b"0";
const SLOT_IN_USE: &[u8] = b"1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdAllocator {
  Counter,
  SlotPool { slots: u32 },
}

impl IdAllocator {
  /// Scan substrates get a slot pool; everything else a counter.
  pub fn for_capability(capability: ContainerCapability, slots: u32) -> Self {
    match capability {
      ContainerCapability::Scan => IdAllocator::SlotPool { slots },
      ContainerCapability::Flat | ContainerCapability::NativeMap => IdAllocator::Counter,
    }
  }

  pub fn recycles_ids(&self) -> bool {
    matches!(self, IdAllocator::SlotPool { .. })
  }

  /// Creates any missing tracker records as free. Records that already
  /// exist are left alone, so concurrent seeders cannot free a taken slot.
  pub fn seed(&self, backend: &dyn KvBackend) -> Result<()> {
    let IdAllocator::SlotPool { slots } = *self else {
      return Ok(());
    };
    let scan = scan_primitives(backend)?;

    // Seeding runs in slot order, so a present last slot means a full table.
    if scan.record_exists(STORE_ID_TRACKER_CONTAINER, slot_key(slots).as_bytes())? {
      return Ok(());
    }

    let mut created = 0;
    for slot in 1..=slots {
      if scan.record_create(STORE_ID_TRACKER_CONTAINER, slot_key(slot).as_bytes(), SLOT_FREE)? {
        created += 1;
      }
    }
    debug!(slots, created, "seeded store id tracker");
    Ok(())
  }

  pub fn allocate(&self, backend: &dyn KvBackend, settings: &MutexSettings) -> Result<u64> {
    match *self {
      IdAllocator::Counter => Ok(backend.incr(GUID_KEY.as_bytes())?),
      IdAllocator::SlotPool { slots } => allocate_slot(backend, slots, settings),
    }
  }

  /// Returns a pooled slot. Counter ids are never reclaimed.
  pub fn release(&self, backend: &dyn KvBackend, id: u64) -> Result<()> {
    if let IdAllocator::SlotPool { slots } = *self {
      if id == 0 || id > u64::from(slots) {
        return Err(DpsError::Allocation(format!("id {id} is outside the slot pool")));
      }
      let scan = scan_primitives(backend)?;
      scan.record_put(STORE_ID_TRACKER_CONTAINER, slot_key(id).as_bytes(), SLOT_FREE)?;
      debug!(id, "released id slot");
    }
    Ok(())
  }
}

fn slot_key(slot: impl std::fmt::Display) -> String {
  slot.to_string()
}

fn scan_primitives(backend: &dyn KvBackend) -> Result<&dyn ScanPrimitives> {
  backend
    .as_scan()
    .ok_or_else(|| DpsError::Unsupported("slot-pool allocation needs a scan substrate".to_string()))
}

fn allocate_slot(backend: &dyn KvBackend, slots: u32, settings: &MutexSettings) -> Result<u64> {
  let scan = scan_primitives(backend)?;
  let _guard = mutex::lock_generic(backend, SLOT_ALLOCATION_MUTEX, settings)?;

  for slot in 1..=u64::from(slots) {
    let key = slot_key(slot);
    let state = scan.record_get(STORE_ID_TRACKER_CONTAINER, key.as_bytes())?;
    if state.as_deref() == Some(SLOT_IN_USE) {
      continue;
    }
    scan.record_put(STORE_ID_TRACKER_CONTAINER, key.as_bytes(), SLOT_IN_USE)?;
    debug!(slot, "allocated id slot");
    return Ok(slot);
  }

  warn!(slots, "all id slots are in use");
  Err(DpsError::Allocation(format!("all {slots} id slots are in use")))
}
