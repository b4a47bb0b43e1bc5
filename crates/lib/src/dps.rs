//! The protocol context every operation runs against.

use std::sync::Arc;

use dps_platform::{MachineDetails, ProcessIdentity};
use tracing::{debug, info};

use crate::alloc::IdAllocator;
use crate::backend::{ContainerCapability, KvBackend};
use crate::clock::{Clock, SystemClock};
use crate::consts::{DEFAULT_MAX_SEGMENT_BYTES, DEFAULT_SLOT_COUNT};
use crate::container::{self, ContentContainer};
use crate::error::Result;
use crate::mutex::MutexSettings;

#[derive(Debug, Clone)]
pub struct DpsOptions {
  /// Catalog segment ceiling for flat substrates.
  pub max_segment_bytes: usize,
  /// Size of the id slot pool on scan substrates.
  pub slot_count: u32,
  pub mutex: MutexSettings,
  pub clock: Arc<dyn Clock>,
  /// Defaults to the running process.
  pub identity: Option<ProcessIdentity>,
}

impl Default for DpsOptions {
  fn default() -> Self {
    Self {
      max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
      slot_count: DEFAULT_SLOT_COUNT,
      mutex: MutexSettings::default(),
      clock: Arc::new(SystemClock),
      identity: None,
    }
  }
}

/// A connection to one substrate plus the store and lock protocol on top.
///
/// All state lives in the substrate; several `Dps` values over handles to
/// the same substrate behave like independent processes.
pub struct Dps {
  pub(crate) backend: Arc<dyn KvBackend>,
  pub(crate) container: Box<dyn ContentContainer>,
  pub(crate) allocator: IdAllocator,
  pub(crate) mutex: MutexSettings,
  pub(crate) clock: Arc<dyn Clock>,
  pub(crate) identity: ProcessIdentity,
}

impl Dps {
  pub fn open(backend: Arc<dyn KvBackend>) -> Result<Self> {
    Self::with_options(backend, DpsOptions::default())
  }

  pub fn with_options(backend: Arc<dyn KvBackend>, options: DpsOptions) -> Result<Self> {
    let capability = backend.capability();
    let allocator = IdAllocator::for_capability(capability, options.slot_count);
    allocator.seed(backend.as_ref())?;

    let container = container::for_backend(Arc::clone(&backend), options.max_segment_bytes);
    let identity = options.identity.unwrap_or_else(ProcessIdentity::current);
    info!(
      product = backend.product_name(),
      strategy = container.strategy(),
      pid = identity.pid,
      "dps ready"
    );

    Ok(Self {
      backend,
      container,
      allocator,
      mutex: options.mutex,
      clock: options.clock,
      identity,
    })
  }

  pub fn backend(&self) -> &dyn KvBackend {
    self.backend.as_ref()
  }

  pub fn capability(&self) -> ContainerCapability {
    self.backend.capability()
  }

  /// Name of the container layout in use.
  pub fn strategy(&self) -> &'static str {
    self.container.strategy()
  }

  pub fn identity(&self) -> &ProcessIdentity {
    &self.identity
  }

  pub fn product_name(&self) -> &str {
    self.backend.product_name()
  }

  pub fn machine_details(&self) -> &MachineDetails {
    &self.identity.machine
  }

  /// Durability is the substrate's business; nothing to flush here.
  pub fn persist(&self) -> Result<()> {
    debug!(product = self.product_name(), "persist requested");
    Ok(())
  }

  pub fn reconnect(&self) -> Result<()> {
    self.backend.reconnect()?;
    info!(product = self.product_name(), "reconnected");
    Ok(())
  }

  pub fn is_connected(&self) -> bool {
    self.backend.is_connected()
  }
}

impl std::fmt::Debug for Dps {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Dps")
      .field("product", &self.product_name())
      .field("strategy", &self.strategy())
      .field("allocator", &self.allocator)
      .field("pid", &self.identity.pid)
      .finish()
  }
}
