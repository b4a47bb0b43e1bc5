use std::path::Path;

use anyhow::{Result, bail};
use clap::Subcommand;
use dps_lib::{KeyForm, ValueForm};

use super::Session;
use crate::output::{OutputFormat, print_info, print_json, print_success};

#[derive(Subcommand)]
pub enum TtlCommand {
  /// Put an entry that expires after --ttl seconds (0 keeps it)
  Put {
    key: String,
    value: String,
    #[arg(long, default_value_t = 0)]
    ttl: u32,
  },
  /// Print the value of an entry
  Get { key: String },
  /// Check whether an entry is present
  Has { key: String },
  /// Delete an entry
  Del { key: String },
}

pub fn cmd_ttl(config: Option<&Path>, command: TtlCommand, output: OutputFormat) -> Result<()> {
  let session = Session::open(config)?;
  let dps = &session.dps;
  let json = output.is_json();

  match command {
    TtlCommand::Put { key, value, ttl } => {
      dps.put_ttl(key.as_bytes(), value.as_bytes(), ttl, KeyForm::Base64, ValueForm::Verbatim)?;
      if json {
        print_json(&serde_json::json!({ "key": key, "ttl_secs": ttl }))?;
      } else if ttl == 0 {
        print_success(&format!("Stored '{}'", key));
      } else {
        print_success(&format!("Stored '{}' for {}s", key, ttl));
      }
    }
    TtlCommand::Get { key } => {
      let Some(value) = dps.get_ttl(key.as_bytes(), KeyForm::Base64)? else {
        bail!("TTL entry '{}' not found", key);
      };
      let value = String::from_utf8_lossy(&value);
      if json {
        print_json(&serde_json::json!({ "key": key, "value": value }))?;
      } else {
        println!("{}", value);
      }
    }
    TtlCommand::Has { key } => {
      let present = dps.has_ttl(key.as_bytes(), KeyForm::Base64)?;
      if json {
        print_json(&serde_json::json!({ "key": key, "present": present }))?;
      } else {
        println!("{}", present);
      }
    }
    TtlCommand::Del { key } => {
      let removed = dps.remove_ttl(key.as_bytes(), KeyForm::Base64)?;
      if json {
        print_json(&serde_json::json!({ "key": key, "removed": removed }))?;
      } else if removed {
        print_success(&format!("Deleted '{}'", key));
      } else {
        print_info(&format!("'{}' was not present", key));
      }
    }
  }
  Ok(())
}
