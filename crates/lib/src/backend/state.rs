//! Substrate semantics shared by the in-tree backends.
//!
//! Expiry is lazy: an expired entry is dropped the next time it is touched.
//! The whole state serializes to JSON with hex-encoded binary keys and
//! values, which is how [`super::FileBackend`] persists it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{BackendError, BackendResult};

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
enum Value {
  Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
  Map(#[serde(with = "hex_pairs")] BTreeMap<Vec<u8>, Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
  value: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  expires_at_ms: Option<u64>,
}

impl Entry {
  fn expired(&self, now_ms: u64) -> bool {
    self.expires_at_ms.is_some_and(|at| at <= now_ms)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Container {
  #[serde(with = "hex_pairs")]
  records: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrateState {
  version: u32,
  #[serde(with = "hex_map")]
  entries: BTreeMap<Vec<u8>, Entry>,
  containers: BTreeMap<String, Container>,
}

impl Default for SubstrateState {
  fn default() -> Self {
    Self {
      version: STATE_VERSION,
      entries: BTreeMap::new(),
      containers: BTreeMap::new(),
    }
  }
}

fn expiry(now_ms: u64, ttl_ms: Option<u64>) -> Option<u64> {
  ttl_ms.map(|ttl| now_ms.saturating_add(ttl))
}

fn wrong_type(key: &[u8]) -> BackendError {
  BackendError::Malformed(format!("WRONGTYPE operation against key {}", String::from_utf8_lossy(key)))
}

impl SubstrateState {
  pub fn version(&self) -> u32 {
    self.version
  }

  fn live(&mut self, key: &[u8], now_ms: u64) -> Option<&mut Entry> {
    if self.entries.get(key).is_some_and(|e| e.expired(now_ms)) {
      self.entries.remove(key);
    }
    self.entries.get_mut(key)
  }

  pub fn get(&mut self, key: &[u8], now_ms: u64) -> BackendResult<Option<Vec<u8>>> {
    match self.live(key, now_ms) {
      None => Ok(None),
      Some(Entry {
        value: Value::Bytes(bytes),
        ..
      }) => Ok(Some(bytes.clone())),
      Some(_) => Err(wrong_type(key)),
    }
  }

  pub fn set(&mut self, key: &[u8], value: &[u8], ttl_ms: Option<u64>, now_ms: u64) {
    self.entries.insert(
      key.to_vec(),
      Entry {
        value: Value::Bytes(value.to_vec()),
        expires_at_ms: expiry(now_ms, ttl_ms),
      },
    );
  }

  pub fn set_nx(&mut self, key: &[u8], value: &[u8], ttl_ms: Option<u64>, now_ms: u64) -> bool {
    if self.live(key, now_ms).is_some() {
      return false;
    }
    self.set(key, value, ttl_ms, now_ms);
    true
  }

  pub fn expire(&mut self, key: &[u8], ttl_ms: u64, now_ms: u64) -> bool {
    match self.live(key, now_ms) {
      Some(entry) => {
        entry.expires_at_ms = expiry(now_ms, Some(ttl_ms));
        true
      }
      None => false,
    }
  }

  pub fn append(&mut self, key: &[u8], value: &[u8], now_ms: u64) -> BackendResult<bool> {
    match self.live(key, now_ms) {
      None => Ok(false),
      Some(Entry {
        value: Value::Bytes(bytes),
        ..
      }) => {
        bytes.extend_from_slice(value);
        Ok(true)
      }
      Some(_) => Err(wrong_type(key)),
    }
  }

  pub fn incr(&mut self, key: &[u8], now_ms: u64) -> BackendResult<u64> {
    let current = match self.live(key, now_ms) {
      None => 0,
      Some(Entry {
        value: Value::Bytes(bytes),
        ..
      }) => std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| BackendError::Malformed("value is not an integer".to_string()))?,
      Some(_) => return Err(wrong_type(key)),
    };
    let next = current + 1;
    let expires_at_ms = self.entries.get(key).and_then(|e| e.expires_at_ms);
    self.entries.insert(
      key.to_vec(),
      Entry {
        value: Value::Bytes(next.to_string().into_bytes()),
        expires_at_ms,
      },
    );
    Ok(next)
  }

  pub fn del(&mut self, key: &[u8], now_ms: u64) -> bool {
    self.live(key, now_ms).is_some() && self.entries.remove(key).is_some()
  }

  pub fn exists(&mut self, key: &[u8], now_ms: u64) -> bool {
    self.live(key, now_ms).is_some()
  }

  fn map(&mut self, key: &[u8], now_ms: u64) -> BackendResult<Option<&mut BTreeMap<Vec<u8>, Vec<u8>>>> {
    match self.live(key, now_ms) {
      None => Ok(None),
      Some(Entry {
        value: Value::Map(map), ..
      }) => Ok(Some(map)),
      Some(_) => Err(wrong_type(key)),
    }
  }

  pub fn map_get(&mut self, key: &[u8], field: &[u8], now_ms: u64) -> BackendResult<Option<Vec<u8>>> {
    Ok(self.map(key, now_ms)?.and_then(|m| m.get(field).cloned()))
  }

  pub fn map_set(&mut self, key: &[u8], field: &[u8], value: &[u8], now_ms: u64) -> BackendResult<()> {
    if let Some(map) = self.map(key, now_ms)? {
      map.insert(field.to_vec(), value.to_vec());
      return Ok(());
    }
    let map = BTreeMap::from([(field.to_vec(), value.to_vec())]);
    self.entries.insert(
      key.to_vec(),
      Entry {
        value: Value::Map(map),
        expires_at_ms: None,
      },
    );
    Ok(())
  }

  /// Removing the last field removes the map itself.
  pub fn map_delete(&mut self, key: &[u8], field: &[u8], now_ms: u64) -> BackendResult<bool> {
    let Some(map) = self.map(key, now_ms)? else {
      return Ok(false);
    };
    let removed = map.remove(field).is_some();
    if map.is_empty() {
      self.entries.remove(key);
    }
    Ok(removed)
  }

  pub fn map_keys(&mut self, key: &[u8], now_ms: u64) -> BackendResult<Vec<Vec<u8>>> {
    Ok(
      self
        .map(key, now_ms)?
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }

  pub fn map_len(&mut self, key: &[u8], now_ms: u64) -> BackendResult<u64> {
    Ok(self.map(key, now_ms)?.map_or(0, |m| m.len() as u64))
  }

  pub fn map_exists(&mut self, key: &[u8], field: &[u8], now_ms: u64) -> BackendResult<bool> {
    Ok(self.map(key, now_ms)?.is_some_and(|m| m.contains_key(field)))
  }

  fn container_mut(&mut self, name: &str, budget: u32) -> BackendResult<&mut Container> {
    if !self.containers.contains_key(name) && self.containers.len() >= budget as usize {
      return Err(BackendError::ContainerBudgetExhausted { budget });
    }
    Ok(self.containers.entry(name.to_string()).or_default())
  }

  pub fn record_get(&self, container: &str, key: &[u8]) -> Option<Vec<u8>> {
    self.containers.get(container).and_then(|c| c.records.get(key).cloned())
  }

  pub fn record_put(&mut self, container: &str, key: &[u8], value: &[u8], budget: u32) -> BackendResult<()> {
    self
      .container_mut(container, budget)?
      .records
      .insert(key.to_vec(), value.to_vec());
    Ok(())
  }

  pub fn record_create(&mut self, container: &str, key: &[u8], value: &[u8], budget: u32) -> BackendResult<bool> {
    let records = &mut self.container_mut(container, budget)?.records;
    if records.contains_key(key) {
      return Ok(false);
    }
    records.insert(key.to_vec(), value.to_vec());
    Ok(true)
  }

  /// Containers outlive their last record.
  pub fn record_delete(&mut self, container: &str, key: &[u8]) -> bool {
    self
      .containers
      .get_mut(container)
      .is_some_and(|c| c.records.remove(key).is_some())
  }

  pub fn record_exists(&self, container: &str, key: &[u8]) -> bool {
    self.containers.get(container).is_some_and(|c| c.records.contains_key(key))
  }

  /// Copy of a container's records in substrate order.
  pub fn records(&self, container: &str) -> Vec<(Vec<u8>, Vec<u8>)> {
    self
      .containers
      .get(container)
      .map(|c| c.records.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
      .unwrap_or_default()
  }

  pub fn container_count(&self) -> usize {
    self.containers.len()
  }
}

mod hex_bytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(d)?;
    hex::decode(raw).map_err(serde::de::Error::custom)
  }
}

mod hex_map {
  use std::collections::BTreeMap;

  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<S: Serializer, V: Serialize>(map: &BTreeMap<Vec<u8>, V>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_map(map.iter().map(|(k, v)| (hex::encode(k), v)))
  }

  pub fn deserialize<'de, D, V>(d: D) -> Result<BTreeMap<Vec<u8>, V>, D::Error>
  where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
  {
    BTreeMap::<String, V>::deserialize(d)?
      .into_iter()
      .map(|(k, v)| hex::decode(k).map(|k| (k, v)).map_err(serde::de::Error::custom))
      .collect()
  }
}

mod hex_pairs {
  use std::collections::BTreeMap;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(map: &BTreeMap<Vec<u8>, Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_map(map.iter().map(|(k, v)| (hex::encode(k), hex::encode(v))))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, D::Error> {
    BTreeMap::<String, String>::deserialize(d)?
      .into_iter()
      .map(|(k, v)| -> Result<(Vec<u8>, Vec<u8>), hex::FromHexError> { Ok((hex::decode(k)?, hex::decode(v)?)) })
      .collect::<Result<BTreeMap<_, _>, _>>()
      .map_err(serde::de::Error::custom)
  }
}
