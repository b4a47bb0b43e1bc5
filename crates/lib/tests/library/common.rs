//! Shared helpers for library integration tests.

use std::sync::Arc;

use dps_lib::backend::{ContainerCapability, MemoryBackend};
use dps_lib::{Dps, DpsOptions};
use dps_platform::ProcessIdentity;

pub const ALL_CAPABILITIES: [ContainerCapability; 3] = [
  ContainerCapability::Flat,
  ContainerCapability::NativeMap,
  ContainerCapability::Scan,
];

pub fn options(pid: u32) -> DpsOptions {
  DpsOptions {
    slot_count: 16,
    max_segment_bytes: 64,
    identity: Some(ProcessIdentity::with_pid(pid)),
    ..DpsOptions::default()
  }
}

/// A substrate plus one `Dps` on it acting as process `pid`.
pub fn open(capability: ContainerCapability, pid: u32) -> (MemoryBackend, Dps) {
  let backend = MemoryBackend::new(capability);
  let dps = attach(&backend, pid);
  (backend, dps)
}

/// Another process on the same substrate.
pub fn attach(backend: &MemoryBackend, pid: u32) -> Dps {
  Dps::with_options(Arc::new(backend.handle()), options(pid)).unwrap()
}
