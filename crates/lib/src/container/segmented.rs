//! Segmented catalog layout for flat substrates.
//!
//! ```text
//! 1<id>          count_^^_segments_^^_lastbytes_^^_b64(name)_^^_b64(ktype)_^^_b64(vtype)
//! 2<id>_<seg>    b64(k1),b64(k2),...
//! 3<id>_<b64k>   <seg>_<value>
//! ```
//!
//! Segments are appended to and wholesale deleted, never merged.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ContentContainer, Cursor, Pair, StoreMetadata, decode_field, utf8};
use crate::backend::KvBackend;
use crate::codec;
use crate::consts::METADATA_DELIMITER;
use crate::error::{DpsError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogInfo {
  count: u64,
  segments: u64,
  /// Hint only; the active segment's real length wins.
  last_segment_bytes: u64,
  name: String,
  key_type: String,
  value_type: String,
}

impl CatalogInfo {
  fn new(metadata: &StoreMetadata) -> Self {
    Self {
      count: 0,
      segments: 1,
      last_segment_bytes: 0,
      name: metadata.name.clone(),
      key_type: metadata.key_type.clone(),
      value_type: metadata.value_type.clone(),
    }
  }

  fn render(&self) -> String {
    [
      self.count.to_string(),
      self.segments.to_string(),
      self.last_segment_bytes.to_string(),
      codec::encode_base64(self.name.as_bytes()),
      codec::encode_base64(self.key_type.as_bytes()),
      codec::encode_base64(self.value_type.as_bytes()),
    ]
    .join(METADATA_DELIMITER)
  }

  fn parse(raw: &[u8], key: &str) -> Result<Self> {
    let malformed = |reason: &str| DpsError::MalformedMetadata {
      key: key.to_string(),
      reason: reason.to_string(),
    };
    let text = std::str::from_utf8(raw).map_err(|_| malformed("not utf-8"))?;
    let parts: Vec<&str> = text.split(METADATA_DELIMITER).collect();
    let [count, segments, last, name, key_type, value_type] = parts[..] else {
      return Err(malformed(&format!("expected 6 fields, found {}", parts.len())));
    };
    let number = |s: &str| s.parse::<u64>().map_err(|_| malformed(&format!("bad number {s:?}")));
    let text_field = |s: &str| utf8(codec::decode_base64(s)?, key);

    let info = Self {
      count: number(count)?,
      segments: number(segments)?,
      last_segment_bytes: number(last)?,
      name: text_field(name)?,
      key_type: text_field(key_type)?,
      value_type: text_field(value_type)?,
    };
    if info.segments == 0 {
      return Err(malformed("segment count is zero"));
    }
    Ok(info)
  }

  fn metadata(&self) -> StoreMetadata {
    StoreMetadata {
      name: self.name.clone(),
      key_type: self.key_type.clone(),
      value_type: self.value_type.clone(),
    }
  }
}

/// Stands in for the empty key, whose base64 form is empty too.
const EMPTY_KEY_TOKEN: &str = "=";

fn catalog_token(encoded: &str) -> &str {
  if encoded.is_empty() { EMPTY_KEY_TOKEN } else { encoded }
}

fn encoded_from_token(token: &str) -> &str {
  if token == EMPTY_KEY_TOKEN { "" } else { token }
}

fn item_value(segment: u64, value: &[u8]) -> Vec<u8> {
  let mut out = format!("{segment}_").into_bytes();
  out.extend_from_slice(value);
  out
}

/// Splits `<seg>_<value>`.
fn split_item<'a>(raw: &'a [u8], key: &str) -> Result<(u64, &'a [u8])> {
  let malformed = || DpsError::MalformedMetadata {
    key: key.to_string(),
    reason: "data item lacks its segment prefix".to_string(),
  };
  let pos = raw.iter().position(|&b| b == b'_').ok_or_else(malformed)?;
  let segment = std::str::from_utf8(&raw[..pos])
    .ok()
    .and_then(|s| s.parse::<u64>().ok())
    .ok_or_else(malformed)?;
  Ok((segment, &raw[pos + 1..]))
}

/// Removes the first exact occurrence of `encoded` from a catalog segment.
fn erase_key(catalog: &str, encoded: &str) -> (String, bool) {
  let mut found = false;
  let kept: Vec<&str> = catalog
    .split(',')
    .filter(|k| !k.is_empty())
    .filter(|k| {
      if !found && *k == encoded {
        found = true;
        return false;
      }
      true
    })
    .collect();
  (kept.join(","), found)
}

pub struct SegmentedContainer {
  backend: Arc<dyn KvBackend>,
  max_segment_bytes: usize,
}

impl SegmentedContainer {
  pub fn new(backend: Arc<dyn KvBackend>, max_segment_bytes: usize) -> Self {
    Self {
      backend,
      max_segment_bytes,
    }
  }

  fn read_info(&self, id: u64) -> Result<CatalogInfo> {
    let key = codec::store_info_key(id);
    let raw = self.backend.get(key.as_bytes())?.ok_or(DpsError::InvalidStoreId(id))?;
    CatalogInfo::parse(&raw, &key)
  }

  fn write_info(&self, id: u64, info: &CatalogInfo) -> Result<()> {
    let key = codec::store_info_key(id);
    self
      .backend
      .set(key.as_bytes(), info.render().as_bytes(), None)
      .map_err(|e| DpsError::write(e, format_args!("store {id} info")))
  }

  fn read_segment(&self, id: u64, segment: u64) -> Result<Option<String>> {
    let key = codec::catalog_segment_key(id, segment);
    self
      .backend
      .get(key.as_bytes())?
      .map(|raw| utf8(raw, &key))
      .transpose()
  }

  /// Length of the active segment, trusting the segment over the hint.
  fn active_segment_len(&self, id: u64, info: &CatalogInfo) -> Result<u64> {
    let Some(catalog) = self.read_segment(id, info.segments)? else {
      return Err(DpsError::InconsistentStoreState {
        id,
        reason: format!("catalog segment {} is missing", info.segments),
      });
    };
    let actual = catalog.len() as u64;
    if actual != info.last_segment_bytes {
      debug!(
        store = id,
        hint = info.last_segment_bytes,
        actual,
        "last segment size hint disagrees with segment"
      );
    }
    Ok(actual)
  }

  /// Erases a deleted item's key from its catalog segment and updates the
  /// count.
  fn unlink(&self, id: u64, info: &mut CatalogInfo, segment: u64, encoded: &str) -> Result<()> {
    let catalog = self.read_segment(id, segment)?.unwrap_or_default();
    let (rest, found) = erase_key(&catalog, catalog_token(encoded));
    if found {
      self
        .backend
        .set(codec::catalog_segment_key(id, segment).as_bytes(), rest.as_bytes(), None)
        .map_err(|e| DpsError::write(e, format_args!("catalog segment {segment}")))?;
    }

    info.count = info.count.saturating_sub(1);
    if segment == info.segments {
      info.last_segment_bytes = rest.len() as u64;
    }
    self.write_info(id, info)?;

    if !found {
      warn!(store = id, segment, "deleted key was missing from its catalog segment");
      return Err(DpsError::InconsistentStoreState {
        id,
        reason: format!("key not found in catalog segment {segment} after deletion"),
      });
    }
    Ok(())
  }

  /// Deletes every data item listed in segments `1..=segments`.
  fn delete_items(&self, id: u64, segments: u64) -> Result<()> {
    for segment in 1..=segments {
      let Some(catalog) = self.read_segment(id, segment)? else {
        continue;
      };
      for token in catalog.split(',').filter(|k| !k.is_empty()) {
        self.backend.del(codec::data_item_key(id, encoded_from_token(token)).as_bytes())?;
      }
    }
    Ok(())
  }
}

impl ContentContainer for SegmentedContainer {
  fn strategy(&self) -> &'static str {
    "segmented"
  }

  fn create(&self, id: u64, metadata: &StoreMetadata) -> Result<()> {
    let info = CatalogInfo::new(metadata);
    self.write_info(id, &info)?;

    let segment = codec::catalog_segment_key(id, 1);
    if let Err(e) = self.backend.set(segment.as_bytes(), b"", None) {
      let info_key = codec::store_info_key(id);
      if let Err(cleanup) = self.backend.del(info_key.as_bytes()) {
        warn!(store = id, key = %info_key, error = %cleanup, "failed to roll back store info");
      }
      return Err(DpsError::write(e, format_args!("store {id} catalog")));
    }
    Ok(())
  }

  fn exists(&self, id: u64) -> Result<bool> {
    Ok(self.backend.exists(codec::store_info_key(id).as_bytes())?)
  }

  fn metadata(&self, id: u64) -> Result<StoreMetadata> {
    Ok(self.read_info(id)?.metadata())
  }

  fn put(&self, id: u64, key: &[u8], value: &[u8]) -> Result<()> {
    let mut info = self.read_info(id)?;
    let encoded = codec::encode_base64(key);
    let item_key = codec::data_item_key(id, &encoded);

    if let Some(existing) = self.backend.get(item_key.as_bytes())? {
      let (segment, _) = split_item(&existing, &item_key)?;
      self
        .backend
        .set(item_key.as_bytes(), &item_value(segment, value), None)
        .map_err(|e| DpsError::write(e, format_args!("store {id} item")))?;
      return Ok(());
    }

    let token = catalog_token(&encoded);
    let mut segment = info.segments;
    let mut used = self.active_segment_len(id, &info)?;
    let mut needed = token.len() as u64 + u64::from(used > 0);
    if used > 0 && used + needed > self.max_segment_bytes as u64 {
      segment += 1;
      let segment_key = codec::catalog_segment_key(id, segment);
      self
        .backend
        .set(segment_key.as_bytes(), b"", None)
        .map_err(|e| DpsError::write(e, format_args!("new catalog segment {segment}")))?;
      debug!(store = id, segment, "opened catalog segment");
      info.segments = segment;
      used = 0;
      needed = token.len() as u64;
    }

    self
      .backend
      .set(item_key.as_bytes(), &item_value(segment, value), None)
      .map_err(|e| DpsError::write(e, format_args!("store {id} item")))?;

    let entry = if used == 0 { token.to_string() } else { format!(",{token}") };
    let segment_key = codec::catalog_segment_key(id, segment);
    match self.backend.append(segment_key.as_bytes(), entry.as_bytes()) {
      Ok(true) => {}
      outcome => {
        warn!(store = id, segment, "catalog append failed, dropping data item");
        if let Err(cleanup) = self.backend.del(item_key.as_bytes()) {
          warn!(store = id, key = %item_key, error = %cleanup, "failed to roll back data item");
        }
        return Err(match outcome {
          Err(e) => DpsError::write(e, format_args!("catalog segment {segment}")),
          Ok(_) => DpsError::Write(format!("catalog segment {segment} vanished")),
        });
      }
    }

    info.count += 1;
    info.last_segment_bytes = used + needed;
    self
      .write_info(id, &info)
      .map_err(|e| DpsError::InconsistentStoreState {
        id,
        reason: format!("item cataloged but count not updated: {e}"),
      })
  }

  fn get(&self, id: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let item_key = codec::data_item_key(id, &codec::encode_base64(key));
    let Some(raw) = self.backend.get(item_key.as_bytes())? else {
      return Ok(None);
    };
    let (_, value) = split_item(&raw, &item_key)?;
    Ok(Some(value.to_vec()))
  }

  fn has(&self, id: u64, key: &[u8]) -> Result<bool> {
    let item_key = codec::data_item_key(id, &codec::encode_base64(key));
    Ok(self.backend.exists(item_key.as_bytes())?)
  }

  fn remove(&self, id: u64, key: &[u8]) -> Result<bool> {
    let mut info = self.read_info(id)?;
    let encoded = codec::encode_base64(key);
    let item_key = codec::data_item_key(id, &encoded);

    let Some(raw) = self.backend.get(item_key.as_bytes())? else {
      return Ok(false);
    };
    let (segment, _) = split_item(&raw, &item_key)?;
    self.backend.del(item_key.as_bytes())?;

    self.unlink(id, &mut info, segment, &encoded).map_err(|e| match e {
      DpsError::InconsistentStoreState { .. } => e,
      other => DpsError::InconsistentStoreState {
        id,
        reason: format!("item deleted but catalog not updated: {other}"),
      },
    })?;
    Ok(true)
  }

  fn clear(&self, id: u64) -> Result<()> {
    let mut info = self.read_info(id)?;
    self.delete_items(id, info.segments)?;
    for segment in 2..=info.segments {
      self.backend.del(codec::catalog_segment_key(id, segment).as_bytes())?;
    }
    self
      .backend
      .set(codec::catalog_segment_key(id, 1).as_bytes(), b"", None)
      .map_err(|e| DpsError::write(e, format_args!("store {id} catalog")))?;

    info.count = 0;
    info.segments = 1;
    info.last_segment_bytes = 0;
    self.write_info(id, &info)
  }

  fn size(&self, id: u64) -> Result<u64> {
    Ok(self.read_info(id)?.count)
  }

  fn destroy(&self, id: u64) -> Result<()> {
    let info = self.read_info(id)?;
    self.delete_items(id, info.segments)?;
    for segment in 1..=info.segments {
      self.backend.del(codec::catalog_segment_key(id, segment).as_bytes())?;
    }
    self.backend.del(codec::store_info_key(id).as_bytes())?;
    Ok(())
  }

  fn open_cursor(&self, id: u64) -> Result<Cursor> {
    let info = self.read_info(id)?;
    Ok(Cursor::Segments {
      next: 1,
      last: info.segments,
      pending: VecDeque::new(),
    })
  }

  fn advance(&self, id: u64, cursor: &mut Cursor) -> Result<Option<Pair>> {
    let Cursor::Segments { next, last, pending } = cursor else {
      return Err(DpsError::Read("cursor does not belong to a segmented store".to_string()));
    };
    loop {
      if let Some(token) = pending.pop_front() {
        let encoded = encoded_from_token(&token);
        let item_key = codec::data_item_key(id, encoded);
        let Some(raw) = self.backend.get(item_key.as_bytes())? else {
          continue;
        };
        let (_, value) = split_item(&raw, &item_key)?;
        return Ok(Some((decode_field(encoded.as_bytes())?, value.to_vec())));
      }
      if *next > *last {
        return Ok(None);
      }
      if let Some(catalog) = self.read_segment(id, *next)? {
        pending.extend(catalog.split(',').filter(|k| !k.is_empty()).map(str::to_string));
      }
      *next += 1;
    }
  }
}
