//! Store directory and data item behaviour across every container layout.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use dps_lib::DpsError;
use dps_lib::backend::ContainerCapability;

use super::common::{ALL_CAPABILITIES, attach, open};

#[test]
fn item_lifecycle_on_every_layout() {
  for capability in ALL_CAPABILITIES {
    let (_backend, dps) = open(capability, 100);
    let store = dps.create_store("lifecycle", "rstring", "int32").unwrap();

    assert_eq!(dps.size(store).unwrap(), 0, "{capability}");
    dps.put(store, b"alpha", b"1").unwrap();
    dps.put(store, b"beta", b"2").unwrap();
    dps.put(store, b"alpha", b"3").unwrap();

    assert_eq!(dps.size(store).unwrap(), 2, "{capability}");
    assert_eq!(dps.get(store, b"alpha").unwrap().as_deref(), Some(&b"3"[..]));
    assert!(dps.has(store, b"beta").unwrap());
    assert!(dps.remove(store, b"beta").unwrap());
    assert!(!dps.remove(store, b"beta").unwrap());
    assert!(!dps.has(store, b"beta").unwrap());
    assert_eq!(dps.size(store).unwrap(), 1, "{capability}");

    dps.clear(store).unwrap();
    assert_eq!(dps.size(store).unwrap(), 0, "{capability}");
    assert_eq!(dps.store_name(store).unwrap(), "lifecycle");
    assert_eq!(dps.key_type(store).unwrap(), "rstring");
    assert_eq!(dps.value_type(store).unwrap(), "int32");
  }
}

#[test]
fn create_or_get_returns_the_same_id() {
  for capability in ALL_CAPABILITIES {
    let (_backend, dps) = open(capability, 100);
    let first = dps.create_or_get_store("shared", "k", "v").unwrap();
    let second = dps.create_or_get_store("shared", "k", "v").unwrap();
    assert_eq!(first, second);
    assert!(matches!(
      dps.create_store("shared", "k", "v"),
      Err(DpsError::StoreExists { id }) if id == first
    ));
    assert_eq!(dps.find_store("shared").unwrap(), first);
  }
}

#[test]
fn concurrent_creates_get_distinct_ids() {
  for capability in ALL_CAPABILITIES {
    let (backend, _dps) = open(capability, 1);

    let ids: Vec<u64> = thread::scope(|scope| {
      let handles: Vec<_> = (0..8)
        .map(|n| {
          let backend = &backend;
          scope.spawn(move || {
            let dps = attach(backend, 200 + n);
            dps.create_store(&format!("store-{n}"), "k", "v").unwrap()
          })
        })
        .collect();
      handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let distinct: BTreeSet<u64> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), ids.len(), "{capability}: {ids:?}");
  }
}

#[test]
fn racing_creates_of_one_name_agree() {
  let (backend, _dps) = open(ContainerCapability::Flat, 1);

  let ids: Vec<u64> = thread::scope(|scope| {
    let handles: Vec<_> = (0..6)
      .map(|n| {
        let backend = &backend;
        scope.spawn(move || attach(backend, 300 + n).create_or_get_store("contended", "k", "v").unwrap())
      })
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  assert!(ids.windows(2).all(|w| w[0] == w[1]), "{ids:?}");
}

#[test]
fn iteration_visits_each_item_once() {
  for capability in ALL_CAPABILITIES {
    let (_backend, dps) = open(capability, 100);
    let store = dps.create_store("walk", "k", "v").unwrap();
    let expected: BTreeMap<Vec<u8>, Vec<u8>> = (0..5)
      .map(|n| (format!("key-{n}").into_bytes(), format!("value-{n}").into_bytes()))
      .collect();
    for (key, value) in &expected {
      dps.put(store, key, value).unwrap();
    }

    let mut iter = dps.new_iterator(store).unwrap();
    let mut seen = BTreeMap::new();
    while let Some((key, value)) = iter.next(store).unwrap() {
      assert!(seen.insert(key, value).is_none(), "{capability}: duplicate key");
    }
    assert_eq!(seen, expected, "{capability}");
    assert!(iter.is_exhausted());
    assert!(iter.next(store).unwrap().is_none());
  }
}

#[test]
fn iterator_is_bound_to_its_store() {
  let (_backend, dps) = open(ContainerCapability::NativeMap, 100);
  let a = dps.create_store("a", "k", "v").unwrap();
  let b = dps.create_store("b", "k", "v").unwrap();
  dps.put(a, b"x", b"1").unwrap();

  let mut iter = dps.new_iterator(a).unwrap();
  assert!(matches!(
    iter.next(b),
    Err(DpsError::IteratorMismatch { expected, got }) if expected == a && got == b
  ));
}

#[test]
fn flat_catalog_spans_segments() {
  // segments are capped at 64 bytes in these tests
  let (_backend, dps) = open(ContainerCapability::Flat, 100);
  let store = dps.create_store("segments", "k", "v").unwrap();
  let keys: Vec<String> = (0..40).map(|n| format!("a-reasonably-long-key-{n:03}")).collect();
  for key in &keys {
    dps.put(store, key.as_bytes(), b"v").unwrap();
  }
  assert_eq!(dps.size(store).unwrap(), 40);

  for key in keys.iter().step_by(3) {
    assert!(dps.remove(store, key.as_bytes()).unwrap());
  }

  let mut iter = dps.new_iterator(store).unwrap();
  let mut seen = BTreeSet::new();
  while let Some((key, _)) = iter.next(store).unwrap() {
    seen.insert(String::from_utf8(key).unwrap());
  }
  let expected: BTreeSet<String> = keys
    .iter()
    .enumerate()
    .filter(|(n, _)| n % 3 != 0)
    .map(|(_, k)| k.clone())
    .collect();
  assert_eq!(seen, expected);
  assert_eq!(dps.size(store).unwrap(), expected.len() as u64);
}

#[test]
fn removed_store_is_gone_and_its_slot_returns() {
  let (_backend, dps) = open(ContainerCapability::Scan, 100);
  let first = dps.create_store("temp", "k", "v").unwrap();
  dps.put(first, b"left", b"over").unwrap();
  dps.remove_store(first).unwrap();

  assert!(matches!(dps.find_store("temp"), Err(DpsError::StoreDoesNotExist(_))));
  assert!(dps.size(first).is_err());

  let second = dps.create_store("next", "k", "v").unwrap();
  assert_eq!(second, first);
  assert_eq!(dps.size(second).unwrap(), 0);
}

#[test]
fn counter_ids_are_not_reused() {
  let (_backend, dps) = open(ContainerCapability::NativeMap, 100);
  let first = dps.create_store("temp", "k", "v").unwrap();
  dps.remove_store(first).unwrap();
  let second = dps.create_store("temp", "k", "v").unwrap();
  assert!(second > first);
}

#[test]
fn safe_variants_reject_unknown_ids() {
  let (_backend, dps) = open(ContainerCapability::Flat, 100);
  assert!(matches!(dps.put_safe(99, b"k", b"v"), Err(DpsError::InvalidStoreId(99))));
  assert!(matches!(dps.get_safe(99, b"k"), Err(DpsError::InvalidStoreId(99))));
  assert!(matches!(dps.new_iterator(99), Err(DpsError::InvalidStoreId(99))));
}

#[test]
fn stores_move_between_layouts() {
  let (_src_backend, src) = open(ContainerCapability::Flat, 100);
  let from = src.create_store("source", "k", "v").unwrap();
  src.put(from, b"", b"empty key").unwrap();
  src.put(from, b"\x00\xff", b"binary").unwrap();
  src.put(from, b"plain", b"").unwrap();
  let payload = src.serialize_store(from).unwrap();

  let (_dst_backend, dst) = open(ContainerCapability::Scan, 100);
  let to = dst.create_store("target", "k", "v").unwrap();
  assert_eq!(dst.deserialize_into_store(to, &payload).unwrap(), 3);
  assert_eq!(dst.get(to, b"").unwrap().as_deref(), Some(&b"empty key"[..]));
  assert_eq!(dst.get(to, b"\x00\xff").unwrap().as_deref(), Some(&b"binary"[..]));
  assert_eq!(dst.get(to, b"plain").unwrap().as_deref(), Some(&b""[..]));
}

#[test]
fn writes_from_one_process_are_visible_to_another() {
  let (backend, writer) = open(ContainerCapability::Flat, 100);
  let reader = attach(&backend, 101);

  let store = writer.create_store("shared", "k", "v").unwrap();
  writer.put(store, b"greeting", b"hello").unwrap();

  assert_eq!(reader.find_store("shared").unwrap(), store);
  assert_eq!(reader.get(store, b"greeting").unwrap().as_deref(), Some(&b"hello"[..]));
}

#[test]
fn substrate_faults_are_retryable_connection_errors() {
  let (backend, dps) = open(ContainerCapability::NativeMap, 100);
  let store = dps.create_store("flaky", "k", "v").unwrap();

  backend.set_fault(true);
  let err = dps.get(store, b"k").unwrap_err();
  assert!(matches!(err, DpsError::Connection(_)));
  assert!(err.is_retryable());
  assert!(dps.reconnect().is_err());

  backend.set_fault(false);
  dps.reconnect().unwrap();
  assert!(dps.is_connected());
  assert_eq!(dps.size(store).unwrap(), 0);
}
