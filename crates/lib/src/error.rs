//! Error type returned by every store and lock operation.

use thiserror::Error;

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, DpsError>;

#[derive(Debug, Error)]
pub enum DpsError {
  #[error("substrate connection error: {0}")]
  Connection(String),

  #[error("read failed: {0}")]
  Read(String),

  #[error("write failed: {0}")]
  Write(String),

  #[error("a store with the same name already exists (id {id})")]
  StoreExists { id: u64 },

  #[error("store does not exist: {0}")]
  StoreDoesNotExist(String),

  #[error("no store with id {0}")]
  InvalidStoreId(u64),

  #[error("lock not found: {0}")]
  LockNotFound(String),

  #[error("timed out after {waited_ms} ms waiting for lock {id}")]
  LockAcquisitionTimeout { id: u64, waited_ms: u128 },

  #[error("gave up on lock {id} after {attempts} attempts")]
  LockAcquisitionFailed { id: u64, attempts: u32 },

  #[error("unable to get the generic mutex for {0}")]
  GenericMutex(String),

  #[error("unable to get the mutex for store {0}")]
  StoreMutex(u64),

  #[error("id allocation failed: {0}")]
  Allocation(String),

  #[error("store {id} is inconsistent: {reason}")]
  InconsistentStoreState { id: u64, reason: String },

  #[error("iterator is bound to store {expected}, not {got}")]
  IteratorMismatch { expected: u64, got: u64 },

  #[error("malformed metadata at {key}: {reason}")]
  MalformedMetadata { key: String, reason: String },

  #[error("malformed wire-form payload: {0}")]
  WireForm(String),

  #[error("not supported by this substrate: {0}")]
  Unsupported(String),
}

impl DpsError {
  /// Stable numeric code, compatible with the historic dps error numbering.
  pub fn code(&self) -> u32 {
    match self {
      DpsError::Connection(_) => 102,
      DpsError::Allocation(_) => 103,
      DpsError::Write(_) => 107,
      DpsError::Read(_) => 108,
      DpsError::StoreExists { .. } => 109,
      DpsError::StoreDoesNotExist(_) => 110,
      DpsError::StoreMutex(_) => 116,
      DpsError::MalformedMetadata { .. } => 126,
      DpsError::InconsistentStoreState { .. } => 129,
      DpsError::IteratorMismatch { .. } => 131,
      DpsError::GenericMutex(_) => 132,
      DpsError::InvalidStoreId(_) => 143,
      DpsError::Unsupported(_) => 153,
      DpsError::WireForm(_) => 154,
      DpsError::LockAcquisitionFailed { .. } => 510,
      DpsError::LockAcquisitionTimeout { .. } => 513,
      DpsError::LockNotFound(_) => 514,
    }
  }

  /// Whether the same call may succeed if simply issued again later.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      DpsError::Connection(_)
        | DpsError::GenericMutex(_)
        | DpsError::StoreMutex(_)
        | DpsError::LockAcquisitionTimeout { .. }
        | DpsError::LockAcquisitionFailed { .. }
    )
  }
}

impl DpsError {
  /// Wraps a failed substrate write as [`DpsError::Write`]. Connection
  /// loss, budget exhaustion and unsupported ops keep their own kinds.
  pub(crate) fn write(err: BackendError, context: impl std::fmt::Display) -> Self {
    match err {
      BackendError::Malformed(reason) => DpsError::Write(format!("{context}: {reason}")),
      other => other.into(),
    }
  }
}

impl From<BackendError> for DpsError {
  fn from(err: BackendError) -> Self {
    match err {
      BackendError::ContainerBudgetExhausted { .. } => DpsError::Allocation(err.to_string()),
      BackendError::Unsupported(op) => DpsError::Unsupported(op.to_string()),
      BackendError::Connection(_) | BackendError::Malformed(_) => DpsError::Connection(err.to_string()),
    }
  }
}
