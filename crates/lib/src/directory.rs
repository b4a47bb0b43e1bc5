//! Store directory: the name <-> id bijection and store lifecycle.

use tracing::{debug, warn};

use crate::codec;
use crate::container::StoreMetadata;
use crate::dps::Dps;
use crate::error::{DpsError, Result};
use crate::mutex;

impl Dps {
  /// Creates a store, failing with [`DpsError::StoreExists`] (carrying the
  /// existing id) when the name is taken.
  pub fn create_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<u64> {
    let backend = self.backend.as_ref();
    let root = codec::store_name_root(name.as_bytes());
    let encoded = codec::encode_base64(name.as_bytes());
    let _guard = mutex::lock_generic(backend, &encoded, &self.mutex)?;

    if let Some(raw) = backend.get(root.as_bytes())? {
      return Err(DpsError::StoreExists {
        id: codec::parse_id(&raw, &root)?,
      });
    }

    let id = self.allocator.allocate(backend, &self.mutex)?;

    if let Err(e) = backend.set(root.as_bytes(), id.to_string().as_bytes(), None) {
      self.release_id(id);
      return Err(DpsError::write(e, "store name root"));
    }

    let metadata = StoreMetadata {
      name: name.to_string(),
      key_type: key_type.to_string(),
      value_type: value_type.to_string(),
    };
    if let Err(e) = self.container.create(id, &metadata) {
      warn!(store = id, name, error = %e, "store creation failed, rolling back");
      self.rollback_root(&root);
      self.release_id(id);
      return Err(e);
    }

    debug!(store = id, name, strategy = self.container.strategy(), "created store");
    Ok(id)
  }

  /// Returns the id of the named store, creating it first if needed.
  pub fn create_or_get_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<u64> {
    match self.create_store(name, key_type, value_type) {
      Err(DpsError::StoreExists { id }) => Ok(id),
      other => other,
    }
  }

  pub fn find_store(&self, name: &str) -> Result<u64> {
    let root = codec::store_name_root(name.as_bytes());
    match self.backend.get(root.as_bytes())? {
      Some(raw) => codec::parse_id(&raw, &root),
      None => Err(DpsError::StoreDoesNotExist(name.to_string())),
    }
  }

  /// Deletes content, metadata and the name root, then frees a pooled id.
  pub fn remove_store(&self, store: u64) -> Result<()> {
    let backend = self.backend.as_ref();
    let _guard = mutex::lock_store(backend, store, &self.mutex)?;

    let metadata = self.container.metadata(store)?;
    self.container.destroy(store)?;
    backend.del(codec::store_name_root(metadata.name.as_bytes()).as_bytes())?;
    self.allocator.release(backend, store)?;

    debug!(store, name = %metadata.name, "removed store");
    Ok(())
  }

  pub fn store_metadata(&self, store: u64) -> Result<StoreMetadata> {
    self.container.metadata(store)
  }

  pub fn store_name(&self, store: u64) -> Result<String> {
    Ok(self.container.metadata(store)?.name)
  }

  pub fn key_type(&self, store: u64) -> Result<String> {
    Ok(self.container.metadata(store)?.key_type)
  }

  pub fn value_type(&self, store: u64) -> Result<String> {
    Ok(self.container.metadata(store)?.value_type)
  }

  /// Deletes a name root written by a half-finished create.
  pub(crate) fn rollback_root(&self, root: &str) {
    if let Err(e) = self.backend.del(root.as_bytes()) {
      warn!(key = %root, error = %e, "failed to roll back name root");
    }
  }

  /// Counter ids are burned; only pooled slots go back.
  pub(crate) fn release_id(&self, id: u64) {
    if let Err(e) = self.allocator.release(self.backend.as_ref(), id) {
      warn!(id, error = %e, "failed to release id during rollback");
    }
  }
}
