//! Lock command implementation.
//!
//! A lock taken here outlives the command; release it with `dps lock
//! release` or let the lease run out.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Subcommand;
use dps_lib::Dps;

use super::Session;
use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success};

#[derive(Subcommand)]
pub enum LockCommand {
  /// Create a lock, or print the id of an existing one
  Create { name: String },
  /// Acquire a lock for this invocation's pid
  Acquire {
    name: String,
    /// Lease in seconds
    #[arg(long, default_value_t = 60)]
    lease: u64,
    /// Maximum wait in seconds
    #[arg(long, default_value_t = 15)]
    wait: u64,
  },
  /// Release a lock regardless of holder
  Release { name: String },
  /// Remove a lock nobody holds
  Remove { name: String },
  /// Print the pid of the last holder
  Pid { name: String },
}

fn existing(dps: &Dps, name: &str) -> Result<u64> {
  dps.find_lock(name).with_context(|| format!("Lock '{}' not found", name))
}

pub fn cmd_lock(config: Option<&Path>, command: LockCommand, output: OutputFormat) -> Result<()> {
  let session = Session::open(config)?;
  let dps = &session.dps;
  let json = output.is_json();

  match command {
    LockCommand::Create { name } => {
      let id = dps.create_or_get_lock(&name)?;
      if json {
        print_json(&serde_json::json!({ "name": name, "id": id }))?;
      } else {
        print_success(&format!("Lock '{}' has id {}", name, id));
      }
    }
    LockCommand::Acquire { name, lease, wait } => {
      let lock = dps.lock(&name)?;
      let started = Instant::now();
      lock.acquire_with(Duration::from_secs(lease), Duration::from_secs(wait))?;
      let info = lock.info()?;
      if json {
        print_json(&serde_json::json!({
          "name": name,
          "id": lock.id(),
          "pid": info.pid,
          "expiry": info.expiry,
        }))?;
      } else {
        print_success(&format!(
          "Acquired '{}' in {}",
          name,
          format_duration(started.elapsed())
        ));
        print_stat("Pid", &info.pid.to_string());
        print_stat("Expires", &info.expiry.to_string());
      }
    }
    LockCommand::Release { name } => {
      let id = existing(dps, &name)?;
      dps.release_lock(id)?;
      if json {
        print_json(&serde_json::json!({ "released": name, "id": id }))?;
      } else {
        print_success(&format!("Released '{}'", name));
      }
    }
    LockCommand::Remove { name } => {
      let id = existing(dps, &name)?;
      dps.remove_lock(id)?;
      if json {
        print_json(&serde_json::json!({ "removed": name, "id": id }))?;
      } else {
        print_success(&format!("Removed lock '{}'", name));
      }
    }
    LockCommand::Pid { name } => {
      let pid = dps.get_pid_for_lock(&name)?;
      if json {
        print_json(&serde_json::json!({ "name": name, "pid": pid }))?;
      } else {
        println!("{}", pid);
      }
    }
  }
  Ok(())
}
