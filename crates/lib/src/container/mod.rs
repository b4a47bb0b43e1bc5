//! Store content containers.
//!
//! One trait, three layouts, picked from the substrate's capability when
//! a [`crate::Dps`] is opened:
//!
//! - [`NativeMapContainer`]: one associative map per store
//! - [`SegmentedContainer`]: flat items indexed by catalog segments
//! - [`ScanContainer`]: one pooled scan container per store
//!
//! Containers never take mutexes themselves; the caller holds the store
//! mutex around every mutation.

mod native_map;
mod scan;
mod segmented;

use std::collections::VecDeque;
use std::sync::Arc;

pub use native_map::NativeMapContainer;
pub use scan::ScanContainer;
pub use segmented::SegmentedContainer;

use crate::backend::{ContainerCapability, KvBackend};
use crate::codec;
use crate::consts::RESERVED_FIELDS;
use crate::error::{DpsError, Result};

/// Name and type tags recorded when a store is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMetadata {
  pub name: String,
  pub key_type: String,
  pub value_type: String,
}

pub type Pair = (Vec<u8>, Vec<u8>);

/// Iteration position inside one store.
#[derive(Debug)]
pub enum Cursor {
  /// Encoded field names listed once up front.
  Fields(VecDeque<Vec<u8>>),
  /// Catalog segments fetched lazily, empty ones skipped.
  Segments {
    next: u64,
    last: u64,
    pending: VecDeque<String>,
  },
  /// Records captured by one full scan, keys still encoded.
  Records(VecDeque<Pair>),
}

pub trait ContentContainer: Send + Sync {
  /// Layout name for diagnostics.
  fn strategy(&self) -> &'static str;

  /// Writes the metadata of a freshly allocated store, leaving nothing
  /// behind on failure.
  fn create(&self, id: u64, metadata: &StoreMetadata) -> Result<()>;

  fn exists(&self, id: u64) -> Result<bool>;

  /// Fails with [`DpsError::InvalidStoreId`] when the store is missing.
  fn metadata(&self, id: u64) -> Result<StoreMetadata>;

  fn put(&self, id: u64, key: &[u8], value: &[u8]) -> Result<()>;

  fn get(&self, id: u64, key: &[u8]) -> Result<Option<Vec<u8>>>;

  fn has(&self, id: u64, key: &[u8]) -> Result<bool>;

  /// Returns whether the key was present.
  fn remove(&self, id: u64, key: &[u8]) -> Result<bool>;

  fn clear(&self, id: u64) -> Result<()>;

  fn size(&self, id: u64) -> Result<u64>;

  /// Deletes content and metadata.
  fn destroy(&self, id: u64) -> Result<()>;

  fn open_cursor(&self, id: u64) -> Result<Cursor>;

  fn advance(&self, id: u64, cursor: &mut Cursor) -> Result<Option<Pair>>;
}

pub fn for_backend(backend: Arc<dyn KvBackend>, max_segment_bytes: usize) -> Box<dyn ContentContainer> {
  match backend.capability() {
    ContainerCapability::NativeMap => Box::new(NativeMapContainer::new(backend)),
    ContainerCapability::Scan => Box::new(ScanContainer::new(backend)),
    ContainerCapability::Flat => Box::new(SegmentedContainer::new(backend, max_segment_bytes)),
  }
}

fn is_reserved(field: &[u8]) -> bool {
  RESERVED_FIELDS.iter().any(|r| r.as_bytes() == field)
}

/// Data keys are stored as base64 text.
fn decode_field(field: &[u8]) -> Result<Vec<u8>> {
  let text = std::str::from_utf8(field).map_err(|_| DpsError::Read("stored key is not base64 text".to_string()))?;
  codec::decode_base64(text)
}

fn utf8(raw: Vec<u8>, key: &str) -> Result<String> {
  String::from_utf8(raw).map_err(|e| DpsError::MalformedMetadata {
    key: key.to_string(),
    reason: e.to_string(),
  })
}
