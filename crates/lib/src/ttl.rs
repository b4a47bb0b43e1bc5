//! Global key/value area with per-entry time to live.
//!
//! Entries live directly under their key: no tag, no store, no catalog.

use std::time::Duration;

use crate::codec;
use crate::dps::Dps;
use crate::error::Result;

/// How a ttl key arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyForm {
  /// Raw bytes, stored base64 encoded.
  #[default]
  Base64,
  /// Length-prefixed wire form, stored as the bytes after the prefix.
  Wire,
}

/// How a ttl value arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueForm {
  /// Stored exactly as given.
  #[default]
  Verbatim,
  /// Length-prefixed wire form, stored without the prefix.
  Wire,
}

fn ttl_key(key: &[u8], form: KeyForm) -> Result<Vec<u8>> {
  match form {
    KeyForm::Base64 => Ok(codec::encode_base64(key).into_bytes()),
    KeyForm::Wire => Ok(codec::strip_wire_prefix(key)?.to_vec()),
  }
}

impl Dps {
  /// `ttl_secs` of zero keeps the entry until removed.
  pub fn put_ttl(
    &self,
    key: &[u8],
    value: &[u8],
    ttl_secs: u32,
    key_form: KeyForm,
    value_form: ValueForm,
  ) -> Result<()> {
    let key = ttl_key(key, key_form)?;
    let value = match value_form {
      ValueForm::Verbatim => value,
      ValueForm::Wire => codec::strip_wire_prefix(value)?,
    };
    let ttl = (ttl_secs > 0).then(|| Duration::from_secs(u64::from(ttl_secs)));
    self.backend.set(&key, value, ttl)?;
    Ok(())
  }

  pub fn get_ttl(&self, key: &[u8], key_form: KeyForm) -> Result<Option<Vec<u8>>> {
    Ok(self.backend.get(&ttl_key(key, key_form)?)?)
  }

  pub fn has_ttl(&self, key: &[u8], key_form: KeyForm) -> Result<bool> {
    Ok(self.backend.exists(&ttl_key(key, key_form)?)?)
  }

  /// Returns whether an entry was removed.
  pub fn remove_ttl(&self, key: &[u8], key_form: KeyForm) -> Result<bool> {
    Ok(self.backend.del(&ttl_key(key, key_form)?)?)
  }
}
