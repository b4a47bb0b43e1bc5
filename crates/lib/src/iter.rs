//! Iteration over one store's data items.

use tracing::debug;

use crate::container::{ContentContainer, Cursor, Pair};
use crate::error::{DpsError, Result};

/// Walks a store in substrate order. Obtained from [`crate::Dps::new_iterator`].
///
/// Once it reports the end it stays exhausted; create a new iterator to
/// walk the store again.
pub struct StoreIterator<'a> {
  container: &'a dyn ContentContainer,
  store: u64,
  cursor: Option<Cursor>,
}

impl<'a> StoreIterator<'a> {
  pub(crate) fn new(container: &'a dyn ContentContainer, store: u64) -> Result<Self> {
    let cursor = container.open_cursor(store)?;
    Ok(Self {
      container,
      store,
      cursor: Some(cursor),
    })
  }

  pub fn store_id(&self) -> u64 {
    self.store
  }

  pub fn is_exhausted(&self) -> bool {
    self.cursor.is_none()
  }

  /// Next key/value pair of `store`, or `None` when there is no more data.
  ///
  /// `store` must be the id this iterator was created for.
  #[allow(clippy::should_implement_trait)]
  pub fn next(&mut self, store: u64) -> Result<Option<Pair>> {
    let Some(cursor) = self.cursor.as_mut() else {
      return Ok(None);
    };
    if store != self.store {
      return Err(DpsError::IteratorMismatch {
        expected: self.store,
        got: store,
      });
    }
    match self.container.advance(self.store, cursor)? {
      Some(pair) => Ok(Some(pair)),
      None => {
        debug!(store = self.store, "iterator exhausted");
        self.cursor = None;
        Ok(None)
      }
    }
  }
}

impl std::fmt::Debug for StoreIterator<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StoreIterator")
      .field("store", &self.store)
      .field("strategy", &self.container.strategy())
      .field("exhausted", &self.is_exhausted())
      .finish()
  }
}
