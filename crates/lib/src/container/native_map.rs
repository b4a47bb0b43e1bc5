use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ContentContainer, Cursor, Pair, StoreMetadata, decode_field, is_reserved, utf8};
use crate::backend::{KvBackend, MapPrimitives};
use crate::codec;
use crate::consts::{KEY_TYPE_FIELD, RESERVED_FIELDS, STORE_NAME_FIELD, VALUE_TYPE_FIELD};
use crate::error::{DpsError, Result};

/// Each store is a map at `1<id>` holding the three reserved metadata
/// fields next to the base64-keyed data fields.
pub struct NativeMapContainer {
  backend: Arc<dyn KvBackend>,
}

impl NativeMapContainer {
  pub fn new(backend: Arc<dyn KvBackend>) -> Self {
    Self { backend }
  }

  fn map(&self) -> Result<&dyn MapPrimitives> {
    self
      .backend
      .as_map()
      .ok_or_else(|| DpsError::Unsupported("substrate has no native map".to_string()))
  }

  fn write_metadata(&self, key: &str, metadata: &StoreMetadata) -> Result<()> {
    let map = self.map()?;
    let fields = [
      (STORE_NAME_FIELD, &metadata.name),
      (KEY_TYPE_FIELD, &metadata.key_type),
      (VALUE_TYPE_FIELD, &metadata.value_type),
    ];
    for (field, value) in fields {
      map
        .map_set(key.as_bytes(), field.as_bytes(), value.as_bytes())
        .map_err(|e| DpsError::write(e, format_args!("{key} metadata")))?;
    }
    Ok(())
  }
}

impl ContentContainer for NativeMapContainer {
  fn strategy(&self) -> &'static str {
    "native-map"
  }

  fn create(&self, id: u64, metadata: &StoreMetadata) -> Result<()> {
    let key = codec::store_info_key(id);
    if let Err(e) = self.write_metadata(&key, metadata) {
      if let Err(cleanup) = self.backend.del(key.as_bytes()) {
        warn!(store = id, key = %key, error = %cleanup, "failed to roll back store metadata");
      }
      return Err(e);
    }
    Ok(())
  }

  fn exists(&self, id: u64) -> Result<bool> {
    let key = codec::store_info_key(id);
    Ok(self.map()?.map_exists(key.as_bytes(), STORE_NAME_FIELD.as_bytes())?)
  }

  fn metadata(&self, id: u64) -> Result<StoreMetadata> {
    let key = codec::store_info_key(id);
    let map = self.map()?;
    let mut fields = Vec::with_capacity(RESERVED_FIELDS.len());
    for field in RESERVED_FIELDS {
      let raw = map
        .map_get(key.as_bytes(), field.as_bytes())?
        .ok_or(DpsError::InvalidStoreId(id))?;
      fields.push(utf8(raw, &key)?);
    }
    let [name, key_type, value_type]: [String; 3] = fields
      .try_into()
      .map_err(|_| DpsError::InvalidStoreId(id))?;
    Ok(StoreMetadata {
      name,
      key_type,
      value_type,
    })
  }

  fn put(&self, id: u64, key: &[u8], value: &[u8]) -> Result<()> {
    let store = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    self
      .map()?
      .map_set(store.as_bytes(), field.as_bytes(), value)
      .map_err(|e| DpsError::write(e, format_args!("store {id} item")))
  }

  fn get(&self, id: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let store = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    Ok(self.map()?.map_get(store.as_bytes(), field.as_bytes())?)
  }

  fn has(&self, id: u64, key: &[u8]) -> Result<bool> {
    let store = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    Ok(self.map()?.map_exists(store.as_bytes(), field.as_bytes())?)
  }

  fn remove(&self, id: u64, key: &[u8]) -> Result<bool> {
    let store = codec::store_info_key(id);
    let field = codec::encode_base64(key);
    Ok(self.map()?.map_delete(store.as_bytes(), field.as_bytes())?)
  }

  /// Drops the whole map and writes the metadata back.
  fn clear(&self, id: u64) -> Result<()> {
    let metadata = self.metadata(id)?;
    let key = codec::store_info_key(id);
    self.backend.del(key.as_bytes())?;
    self
      .write_metadata(&key, &metadata)
      .map_err(|e| DpsError::InconsistentStoreState {
        id,
        reason: format!("metadata lost while clearing: {e}"),
      })?;
    debug!(store = id, "cleared native map store");
    Ok(())
  }

  fn size(&self, id: u64) -> Result<u64> {
    let key = codec::store_info_key(id);
    let len = self.map()?.map_len(key.as_bytes())?;
    if len == 0 {
      return Err(DpsError::InvalidStoreId(id));
    }
    Ok(len.saturating_sub(RESERVED_FIELDS.len() as u64))
  }

  fn destroy(&self, id: u64) -> Result<()> {
    self.backend.del(codec::store_info_key(id).as_bytes())?;
    Ok(())
  }

  fn open_cursor(&self, id: u64) -> Result<Cursor> {
    let key = codec::store_info_key(id);
    let fields = self
      .map()?
      .map_keys(key.as_bytes())?
      .into_iter()
      .filter(|f| !is_reserved(f))
      .collect();
    Ok(Cursor::Fields(fields))
  }

  fn advance(&self, id: u64, cursor: &mut Cursor) -> Result<Option<Pair>> {
    let Cursor::Fields(fields) = cursor else {
      return Err(DpsError::Read("cursor does not belong to a native map store".to_string()));
    };
    let key = codec::store_info_key(id);
    let map = self.map()?;
    while let Some(field) = fields.pop_front() {
      // removed since the listing
      let Some(value) = map.map_get(key.as_bytes(), &field)? else {
        continue;
      };
      return Ok(Some((decode_field(&field)?, value)));
    }
    Ok(None)
  }
}
