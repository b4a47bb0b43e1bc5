//! Namespace layout and binary-safe key encoding.
//!
//! Every substrate key is `<tag><body>[suffix]`. Tags are plain decimal
//! strings; names and data keys are standard padded base64, which never
//! contains `_`, `,` or any of the reserved field names.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::consts::{
  CATALOG_TAG, DATA_ITEM_TAG, GENERIC_LOCK_TAG, GENERIC_LOCK_TOKEN, LOCK_INFO_TAG, LOCK_NAME_TAG, LOCK_TAG,
  LOCK_TOKEN, STORE_INFO_TAG, STORE_LOCK_TAG, STORE_LOCK_TOKEN, STORE_NAME_TAG,
};
use crate::error::{DpsError, Result};

pub fn encode_base64(bytes: &[u8]) -> String {
  STANDARD.encode(bytes)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
  STANDARD
    .decode(encoded)
    .map_err(|e| DpsError::Read(format!("invalid base64 '{encoded}': {e}")))
}

pub fn store_name_root(name: &[u8]) -> String {
  format!("{STORE_NAME_TAG}{}", encode_base64(name))
}

pub fn store_info_key(id: u64) -> String {
  format!("{STORE_INFO_TAG}{id}")
}

pub fn catalog_segment_key(id: u64, segment: u64) -> String {
  format!("{CATALOG_TAG}{id}_{segment}")
}

/// `encoded_key` is the base64 form of the user key.
pub fn data_item_key(id: u64, encoded_key: &str) -> String {
  format!("{DATA_ITEM_TAG}{id}_{encoded_key}")
}

pub fn store_mutex_key(id: u64) -> String {
  format!("{STORE_LOCK_TAG}{id}{STORE_LOCK_TOKEN}")
}

pub fn lock_name_root(name: &[u8]) -> String {
  format!("{LOCK_NAME_TAG}{}", encode_base64(name))
}

pub fn lock_info_key(id: u64) -> String {
  format!("{LOCK_INFO_TAG}{id}")
}

pub fn lock_marker_key(id: u64) -> String {
  format!("{LOCK_TAG}{id}{LOCK_TOKEN}")
}

pub fn generic_mutex_key(entity: &str) -> String {
  format!("{GENERIC_LOCK_TAG}{entity}{GENERIC_LOCK_TOKEN}")
}

/// Parses an id stored as decimal text under `key`.
pub fn parse_id(raw: &[u8], key: &str) -> Result<u64> {
  std::str::from_utf8(raw)
    .ok()
    .and_then(|s| s.trim().parse::<u64>().ok())
    .ok_or_else(|| DpsError::MalformedMetadata {
      key: key.to_string(),
      reason: format!("expected a numeric id, found {:?}", String::from_utf8_lossy(raw)),
    })
}

/// Strips the length prefix of a pre-encoded wire-form payload.
///
/// A first byte below `0x80` is a one byte length. Otherwise the payload
/// starts with a `0x80` marker and a four byte little-endian length. The
/// declared length must match the bytes that follow.
pub fn strip_wire_prefix(payload: &[u8]) -> Result<&[u8]> {
  let (declared, body) = match payload {
    [] => return Err(DpsError::WireForm("empty payload".to_string())),
    [len, body @ ..] if *len < 0x80 => (u64::from(*len), body),
    [_, a, b, c, d, body @ ..] => (u64::from(u32::from_le_bytes([*a, *b, *c, *d])), body),
    _ => {
      return Err(DpsError::WireForm(format!(
        "long-form prefix needs 5 bytes, payload has {}",
        payload.len()
      )));
    }
  };
  if declared != body.len() as u64 {
    return Err(DpsError::WireForm(format!(
      "prefix declares {declared} bytes, payload carries {}",
      body.len()
    )));
  }
  Ok(body)
}

/// Produces the wire form that [`strip_wire_prefix`] accepts.
pub fn wire_encode(bytes: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(bytes.len() + 5);
  if bytes.len() < 0x80 {
    out.push(bytes.len() as u8);
  } else {
    out.push(0x80);
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
  }
  out.extend_from_slice(bytes);
  out
}
