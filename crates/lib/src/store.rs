//! Data item operations on an existing store.
//!
//! Mutations hold the store mutex; reads are lock-free. The `_safe`
//! variants confirm the store exists before touching it.

use tracing::debug;

use crate::dps::Dps;
use crate::error::{DpsError, Result};
use crate::iter::StoreIterator;
use crate::mutex;

impl Dps {
  pub fn put(&self, store: u64, key: &[u8], value: &[u8]) -> Result<()> {
    let _guard = mutex::lock_store(self.backend.as_ref(), store, &self.mutex)?;
    self.container.put(store, key, value)
  }

  pub fn put_safe(&self, store: u64, key: &[u8], value: &[u8]) -> Result<()> {
    let _guard = mutex::lock_store(self.backend.as_ref(), store, &self.mutex)?;
    self.ensure_store(store)?;
    self.container.put(store, key, value)
  }

  pub fn get(&self, store: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
    self.container.get(store, key)
  }

  pub fn get_safe(&self, store: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
    self.ensure_store(store)?;
    self.container.get(store, key)
  }

  /// Returns whether the key was present.
  pub fn remove(&self, store: u64, key: &[u8]) -> Result<bool> {
    let _guard = mutex::lock_store(self.backend.as_ref(), store, &self.mutex)?;
    self.container.remove(store, key)
  }

  pub fn has(&self, store: u64, key: &[u8]) -> Result<bool> {
    self.container.has(store, key)
  }

  pub fn clear(&self, store: u64) -> Result<()> {
    let _guard = mutex::lock_store(self.backend.as_ref(), store, &self.mutex)?;
    self.container.clear(store)
  }

  /// Number of data items, metadata excluded.
  pub fn size(&self, store: u64) -> Result<u64> {
    self.container.size(store)
  }

  pub fn new_iterator(&self, store: u64) -> Result<StoreIterator<'_>> {
    self.ensure_store(store)?;
    StoreIterator::new(self.container.as_ref(), store)
  }

  /// Every pair of the store as `len(u32 LE) key len(u32 LE) value` records.
  pub fn serialize_store(&self, store: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut iter = self.new_iterator(store)?;
    let mut count = 0u64;
    while let Some((key, value)) = iter.next(store)? {
      for part in [&key, &value] {
        let len = u32::try_from(part.len()).map_err(|_| DpsError::WireForm("item exceeds 4 GiB".to_string()))?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(part);
      }
      count += 1;
    }
    debug!(store, count, bytes = out.len(), "serialized store");
    Ok(out)
  }

  /// Puts every pair of a [`Dps::serialize_store`] payload into `store`.
  /// Returns the number of pairs written.
  pub fn deserialize_into_store(&self, store: u64, payload: &[u8]) -> Result<u64> {
    self.ensure_store(store)?;
    let mut rest = payload;
    let mut count = 0u64;
    while !rest.is_empty() {
      let key = take_chunk(&mut rest)?;
      let value = take_chunk(&mut rest)?;
      self.put(store, key, value)?;
      count += 1;
    }
    debug!(store, count, "deserialized into store");
    Ok(count)
  }

  pub(crate) fn ensure_store(&self, store: u64) -> Result<()> {
    if self.container.exists(store)? {
      Ok(())
    } else {
      Err(DpsError::InvalidStoreId(store))
    }
  }
}

fn take_chunk<'a>(rest: &mut &'a [u8]) -> Result<&'a [u8]> {
  let truncated = || DpsError::WireForm("truncated store payload".to_string());
  let current: &'a [u8] = rest;
  let (len, tail) = current.split_first_chunk::<4>().ok_or_else(truncated)?;
  let len = u32::from_le_bytes(*len) as usize;
  if tail.len() < len {
    return Err(truncated());
  }
  let (chunk, tail) = tail.split_at(len);
  *rest = tail;
  Ok(chunk)
}
