//! The file substrate shared by several processes through one directory.

use std::sync::Arc;
use std::thread;

use dps_lib::backend::{ContainerCapability, FileBackend};
use dps_lib::{Dps, DpsError, KeyForm, ValueForm};
use dps_platform::ProcessIdentity;
use tempfile::TempDir;

use super::common::{ALL_CAPABILITIES, options};

fn open_dir(dir: &TempDir, capability: ContainerCapability, pid: u32) -> Dps {
  let backend = FileBackend::open(dir.path(), capability).unwrap();
  Dps::with_options(Arc::new(backend), options(pid)).unwrap()
}

#[test]
fn stores_survive_reopening() {
  for capability in ALL_CAPABILITIES {
    let temp = TempDir::new().unwrap();
    let store = {
      let dps = open_dir(&temp, capability, 1);
      let store = dps.create_store("persistent", "k", "v").unwrap();
      dps.put(store, b"kept", b"yes").unwrap();
      store
    };

    let dps = open_dir(&temp, capability, 2);
    assert_eq!(dps.find_store("persistent").unwrap(), store);
    assert_eq!(dps.get(store, b"kept").unwrap().as_deref(), Some(&b"yes"[..]));
    assert_eq!(dps.size(store).unwrap(), 1, "{capability}");
  }
}

#[test]
fn concurrent_writers_lose_nothing() {
  let temp = TempDir::new().unwrap();
  let store = open_dir(&temp, ContainerCapability::Flat, 1)
    .create_store("counted", "k", "v")
    .unwrap();

  thread::scope(|scope| {
    for writer in 0..4u32 {
      let temp = &temp;
      scope.spawn(move || {
        let dps = open_dir(temp, ContainerCapability::Flat, 10 + writer);
        for n in 0..10 {
          dps.put(store, format!("w{writer}-{n}").as_bytes(), b"x").unwrap();
        }
      });
    }
  });

  let dps = open_dir(&temp, ContainerCapability::Flat, 99);
  assert_eq!(dps.size(store).unwrap(), 40);
}

#[test]
fn ttl_entries_roundtrip_through_the_file() {
  let temp = TempDir::new().unwrap();
  let dps = open_dir(&temp, ContainerCapability::NativeMap, 1);
  dps
    .put_ttl(b"session", b"token", 0, KeyForm::Base64, ValueForm::Verbatim)
    .unwrap();

  let again = open_dir(&temp, ContainerCapability::NativeMap, 2);
  assert_eq!(
    again.get_ttl(b"session", KeyForm::Base64).unwrap().as_deref(),
    Some(&b"token"[..])
  );
  assert!(again.remove_ttl(b"session", KeyForm::Base64).unwrap());
  assert!(!dps.has_ttl(b"session", KeyForm::Base64).unwrap());
}

#[test]
fn identity_defaults_to_this_process() {
  let temp = TempDir::new().unwrap();
  let backend = FileBackend::open(temp.path(), ContainerCapability::Flat).unwrap();
  let dps = Dps::open(Arc::new(backend)).unwrap();
  assert_eq!(dps.identity().pid, ProcessIdentity::current().pid);
  assert_eq!(dps.product_name(), "file");
  assert!(matches!(dps.find_store("absent"), Err(DpsError::StoreDoesNotExist(_))));
}
