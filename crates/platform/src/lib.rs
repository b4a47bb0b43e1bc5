//! Process and host identity for dps
//!
//! This crate provides the identity a process presents to the shared store:
//! - OS and architecture detection
//! - Host name and OS version
//! - The process id recorded as a lock owner

mod error;
mod identity;
mod platform;

pub use error::PlatformError;
pub use identity::{MachineDetails, ProcessIdentity};
pub use platform::{Arch, Os, Platform};
