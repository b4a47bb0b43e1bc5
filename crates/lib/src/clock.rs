//! Wall clock used for lock expiry and substrate ttls.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync + Debug {
  /// Time since the Unix epoch.
  fn now(&self) -> Duration;

  fn now_secs(&self) -> u64 {
    self.now().as_secs()
  }

  fn now_millis(&self) -> u64 {
    self.now().as_millis() as u64
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
  }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
  millis: AtomicU64,
}

impl ManualClock {
  pub fn new(start: Duration) -> Self {
    Self {
      millis: AtomicU64::new(start.as_millis() as u64),
    }
  }

  /// Starts at the current system time.
  pub fn starting_now() -> Self {
    Self::new(SystemClock.now())
  }

  pub fn advance(&self, by: Duration) {
    self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
  }

  pub fn set(&self, to: Duration) {
    self.millis.store(to.as_millis() as u64, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Duration {
    Duration::from_millis(self.millis.load(Ordering::SeqCst))
  }
}
