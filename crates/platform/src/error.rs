//! Error types for dps-platform

use thiserror::Error;

/// Errors that can occur while gathering host details
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Failed to get hostname: {0}")]
    Hostname(String),
}
