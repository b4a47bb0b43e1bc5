//! Named locks shared between processes on one substrate.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use dps_lib::DpsError;
use dps_lib::backend::ContainerCapability;

use super::common::{ALL_CAPABILITIES, attach, open};

#[test]
fn at_most_one_concurrent_acquirer_wins() {
  for capability in ALL_CAPABILITIES {
    let (backend, setup) = open(capability, 1);
    let id = setup.create_or_get_lock("exclusive").unwrap();
    let winners = AtomicU32::new(0);

    thread::scope(|scope| {
      for pid in [500, 501] {
        let backend = &backend;
        let winners = &winners;
        scope.spawn(move || {
          let dps = attach(backend, pid);
          match dps.acquire_lock(id, Duration::from_secs(5), Duration::from_millis(300)) {
            Ok(()) => {
              winners.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => assert!(
              matches!(
                e,
                DpsError::LockAcquisitionTimeout { .. } | DpsError::LockAcquisitionFailed { .. }
              ),
              "{capability}: {e}"
            ),
          }
        });
      }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1, "{capability}");
    let owner = setup.get_pid_for_lock("exclusive").unwrap();
    assert!(owner == 500 || owner == 501);
  }
}

#[test]
fn released_lock_passes_to_the_next_process() {
  let (backend, first) = open(ContainerCapability::Flat, 10);
  let second = attach(&backend, 11);

  let lock = first.lock("handoff").unwrap();
  lock.acquire_with(Duration::from_secs(30), Duration::from_secs(1)).unwrap();
  let same = second.lock("handoff").unwrap();
  assert_eq!(same.id(), lock.id());

  assert!(same.acquire_with(Duration::from_secs(30), Duration::from_millis(50)).is_err());
  lock.release().unwrap();
  same.acquire_with(Duration::from_secs(30), Duration::from_secs(1)).unwrap();
  assert_eq!(first.get_pid_for_lock("handoff").unwrap(), 11);
}

#[test]
fn expired_lease_lets_a_waiter_in() {
  let (backend, holder) = open(ContainerCapability::NativeMap, 20);
  let waiter = attach(&backend, 21);

  let id = holder.create_or_get_lock("short").unwrap();
  holder.acquire_lock(id, Duration::from_secs(1), Duration::from_secs(1)).unwrap();

  waiter.acquire_lock(id, Duration::from_secs(5), Duration::from_secs(4)).unwrap();
  assert_eq!(waiter.get_pid_for_lock("short").unwrap(), 21);
}

#[test]
fn locks_and_stores_share_the_id_space() {
  for capability in ALL_CAPABILITIES {
    let (_backend, dps) = open(capability, 30);
    let store = dps.create_store("things", "k", "v").unwrap();
    let lock = dps.create_or_get_lock("things").unwrap();
    assert_ne!(store, lock, "{capability}");
  }
}

#[test]
fn removed_lock_frees_its_slot() {
  let (_backend, dps) = open(ContainerCapability::Scan, 40);
  let lock = dps.create_or_get_lock("temporary").unwrap();
  dps.remove_lock(lock).unwrap();

  assert!(matches!(dps.get_pid_for_lock("temporary"), Err(DpsError::LockNotFound(_))));
  let store = dps.create_store("reuses-slot", "k", "v").unwrap();
  assert_eq!(store, lock);
}

#[test]
fn remove_waits_out_a_holder() {
  let (backend, holder) = open(ContainerCapability::Flat, 50);
  let remover = attach(&backend, 51);
  let id = holder.create_or_get_lock("busy").unwrap();
  holder.acquire_lock(id, Duration::from_secs(60), Duration::from_secs(1)).unwrap();

  let err = remover.remove_lock(id).unwrap_err();
  assert!(err.is_retryable(), "{err}");
  assert_eq!(holder.get_pid_for_lock("busy").unwrap(), 50);
}
