//! Identity of the calling process
//!
//! Locks record the owning pid, and stores report the machine they were
//! opened from. Both come from here.

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

use crate::error::PlatformError;
use crate::platform::Platform;

/// Host name, OS version and CPU architecture of this machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDetails {
    pub hostname: String,
    pub os_version: String,
    pub arch: String,
}

impl MachineDetails {
    /// Gather details about the current machine
    ///
    /// Missing pieces are reported as `"unknown"` rather than failing.
    pub fn current() -> Self {
        let hostname = hostname().unwrap_or_else(|e| {
            debug!(error = %e, "hostname lookup failed");
            "unknown".to_string()
        });
        let os_version = System::long_os_version().unwrap_or_else(|| "unknown".to_string());
        let arch = Platform::current()
            .map(|p| p.arch.to_string())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());

        Self {
            hostname,
            os_version,
            arch,
        }
    }
}

/// The identity a process presents when it takes a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub machine: MachineDetails,
}

impl ProcessIdentity {
    /// Identity of the running process
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            machine: MachineDetails::current(),
        }
    }

    /// Identity with an explicit pid, for simulating other processes
    pub fn with_pid(pid: u32) -> Self {
        Self {
            pid,
            machine: MachineDetails::current(),
        }
    }
}

fn hostname() -> Result<String, PlatformError> {
    whoami::fallible::hostname().map_err(|e| PlatformError::Hostname(e.to_string()))
}
