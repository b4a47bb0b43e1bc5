use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ContentContainer, Cursor, Pair, StoreMetadata, decode_field, is_reserved, utf8};
use crate::backend::{KvBackend, ScanPrimitives};
use crate::codec;
use crate::consts::{KEY_TYPE_FIELD, RESERVED_FIELDS, STORE_NAME_FIELD, VALUE_TYPE_FIELD};
use crate::error::{DpsError, Result};

/// Each store owns the pooled container named after its slot id. The three
/// metadata records live beside the data records, so size, clear and
/// iteration all filter them out of a full scan.
pub struct ScanContainer {
  backend: Arc<dyn KvBackend>,
}

impl ScanContainer {
  pub fn new(backend: Arc<dyn KvBackend>) -> Self {
    Self { backend }
  }

  fn scan(&self) -> Result<&dyn ScanPrimitives> {
    self
      .backend
      .as_scan()
      .ok_or_else(|| DpsError::Unsupported("substrate has no scan containers".to_string()))
  }

  fn keys(&self, container: &str, include_reserved: bool) -> Result<Vec<Vec<u8>>> {
    let mut keys = Vec::new();
    self.scan()?.scan(container, &mut |k, _| {
      if include_reserved || !is_reserved(k) {
        keys.push(k.to_vec());
      }
      true
    })?;
    Ok(keys)
  }

  fn delete_records(&self, container: &str, include_reserved: bool) -> Result<usize> {
    let scan = self.scan()?;
    let keys = self.keys(container, include_reserved)?;
    for key in &keys {
      scan.record_delete(container, key)?;
    }
    Ok(keys.len())
  }
}

impl ContentContainer for ScanContainer {
  fn strategy(&self) -> &'static str {
    "scan"
  }

  fn create(&self, id: u64, metadata: &StoreMetadata) -> Result<()> {
    let container = codec::store_info_key(id);
    let scan = self.scan()?;

    // a recycled slot may still hold records from a half-finished removal
    let leftovers = self.delete_records(&container, true)?;
    if leftovers > 0 {
      debug!(store = id, leftovers, "purged records from recycled container");
    }

    let records = [
      (STORE_NAME_FIELD, &metadata.name),
      (KEY_TYPE_FIELD, &metadata.key_type),
      (VALUE_TYPE_FIELD, &metadata.value_type),
    ];
    for (written, (field, value)) in records.iter().enumerate() {
      if let Err(e) = scan.record_put(&container, field.as_bytes(), value.as_bytes()) {
        for (field, _) in &records[..written] {
          if let Err(cleanup) = scan.record_delete(&container, field.as_bytes()) {
            warn!(
              store = id,
              container = %container,
              field = %field,
              error = %cleanup,
              "failed to roll back metadata record"
            );
          }
        }
        return Err(DpsError::write(e, format_args!("store {id} metadata")));
      }
    }
    Ok(())
  }

  fn exists(&self, id: u64) -> Result<bool> {
    let container = codec::store_info_key(id);
    Ok(self.scan()?.record_exists(&container, STORE_NAME_FIELD.as_bytes())?)
  }

  fn metadata(&self, id: u64) -> Result<StoreMetadata> {
    let container = codec::store_info_key(id);
    let scan = self.scan()?;
    let read = |field: &str| -> Result<String> {
      let raw = scan
        .record_get(&container, field.as_bytes())?
        .ok_or(DpsError::InvalidStoreId(id))?;
      utf8(raw, &container)
    };
    Ok(StoreMetadata {
      name: read(STORE_NAME_FIELD)?,
      key_type: read(KEY_TYPE_FIELD)?,
      value_type: read(VALUE_TYPE_FIELD)?,
    })
  }

  fn put(&self, id: u64, key: &[u8], value: &[u8]) -> Result<()> {
    let container = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    self
      .scan()?
      .record_put(&container, field.as_bytes(), value)
      .map_err(|e| DpsError::write(e, format_args!("store {id} item")))
  }

  fn get(&self, id: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let container = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    Ok(self.scan()?.record_get(&container, field.as_bytes())?)
  }

  fn has(&self, id: u64, key: &[u8]) -> Result<bool> {
    let container = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    Ok(self.scan()?.record_exists(&container, field.as_bytes())?)
  }

  fn remove(&self, id: u64, key: &[u8]) -> Result<bool> {
    let container = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    Ok(self.scan()?.record_delete(&container, field.as_bytes())?)
  }

  fn clear(&self, id: u64) -> Result<()> {
    if !self.exists(id)? {
      return Err(DpsError::InvalidStoreId(id));
    }
    let removed = self.delete_records(&codec::store_info_key(id), false)?;
    debug!(store = id, removed, "cleared scan store");
    Ok(())
  }

  fn size(&self, id: u64) -> Result<u64> {
    if !self.exists(id)? {
      return Err(DpsError::InvalidStoreId(id));
    }
    let container = codec::store_info_key(id);
    let mut count = 0;
    self.scan()?.scan(&container, &mut |k, _| {
      if !is_reserved(k) {
        count += 1;
      }
      true
    })?;
    Ok(count)
  }

  /// The container itself stays behind for the next store in this slot.
  fn destroy(&self, id: u64) -> Result<()> {
    self.delete_records(&codec::store_info_key(id), true)?;
    Ok(())
  }

  fn open_cursor(&self, id: u64) -> Result<Cursor> {
    let container = codec::store_info_key(id);
    let mut records = VecDeque::new();
    self.scan()?.scan(&container, &mut |k, v| {
      if !is_reserved(k) {
        records.push_back((k.to_vec(), v.to_vec()));
      }
      true
    })?;
    Ok(Cursor::Records(records))
  }

  fn advance(&self, _id: u64, cursor: &mut Cursor) -> Result<Option<Pair>> {
    let Cursor::Records(records) = cursor else {
      return Err(DpsError::Read("cursor does not belong to a scan store".to_string()));
    };
    match records.pop_front() {
      Some((field, value)) => Ok(Some((decode_field(&field)?, value))),
      None => Ok(None),
    }
  }
}
