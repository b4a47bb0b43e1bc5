//! Store command implementation.
//!
//! Keys and values are taken from the command line as UTF-8 and printed
//! back lossily.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use dps_lib::Dps;

use super::Session;
use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, symbols};

#[derive(Subcommand)]
pub enum StoreCommand {
  /// Create a store, failing if the name is taken
  Create {
    name: String,
    /// Type name recorded for keys
    #[arg(long, default_value = "rstring")]
    key_type: String,
    /// Type name recorded for values
    #[arg(long, default_value = "rstring")]
    value_type: String,
    /// Return the existing id instead of failing
    #[arg(long)]
    or_get: bool,
  },
  /// Print the id of a store
  Find { name: String },
  /// Remove a store and everything in it
  Remove { name: String },
  /// Put a key/value pair
  Put { name: String, key: String, value: String },
  /// Print the value of a key
  Get { name: String, key: String },
  /// Check whether a key is present
  Has { name: String, key: String },
  /// Delete a key
  Del { name: String, key: String },
  /// Delete every key
  Clear { name: String },
  /// Print the number of keys
  Size { name: String },
  /// Print every key/value pair
  List { name: String },
}

fn lossy(bytes: &[u8]) -> String {
  String::from_utf8_lossy(bytes).into_owned()
}

fn find(dps: &Dps, name: &str) -> Result<u64> {
  dps.find_store(name).with_context(|| format!("Store '{}' not found", name))
}

pub fn cmd_store(config: Option<&Path>, command: StoreCommand, output: OutputFormat) -> Result<()> {
  let session = Session::open(config)?;
  let dps = &session.dps;
  let json = output.is_json();

  match command {
    StoreCommand::Create {
      name,
      key_type,
      value_type,
      or_get,
    } => {
      let id = if or_get {
        dps.create_or_get_store(&name, &key_type, &value_type)?
      } else {
        dps.create_store(&name, &key_type, &value_type)?
      };
      if json {
        print_json(&serde_json::json!({ "name": name, "id": id }))?;
      } else {
        print_success(&format!("Store '{}' has id {}", name, id));
      }
    }
    StoreCommand::Find { name } => {
      let id = find(dps, &name)?;
      let metadata = dps.store_metadata(id)?;
      if json {
        print_json(&serde_json::json!({
          "id": id,
          "name": metadata.name,
          "key_type": metadata.key_type,
          "value_type": metadata.value_type,
        }))?;
      } else {
        println!("{}", id);
      }
    }
    StoreCommand::Remove { name } => {
      let id = find(dps, &name)?;
      dps.remove_store(id)?;
      if json {
        print_json(&serde_json::json!({ "removed": name, "id": id }))?;
      } else {
        print_success(&format!("Removed store '{}'", name));
      }
    }
    StoreCommand::Put { name, key, value } => {
      let id = find(dps, &name)?;
      dps.put_safe(id, key.as_bytes(), value.as_bytes())?;
      if json {
        print_json(&serde_json::json!({ "store": id, "key": key }))?;
      } else {
        print_success(&format!("{} {} {}", key, symbols::ARROW, value));
      }
    }
    StoreCommand::Get { name, key } => {
      let id = find(dps, &name)?;
      let Some(value) = dps.get_safe(id, key.as_bytes())? else {
        bail!("Key '{}' not found in store '{}'", key, name);
      };
      if json {
        print_json(&serde_json::json!({ "store": id, "key": key, "value": lossy(&value) }))?;
      } else {
        println!("{}", lossy(&value));
      }
    }
    StoreCommand::Has { name, key } => {
      let id = find(dps, &name)?;
      let present = dps.has(id, key.as_bytes())?;
      if json {
        print_json(&serde_json::json!({ "store": id, "key": key, "present": present }))?;
      } else {
        println!("{}", present);
      }
    }
    StoreCommand::Del { name, key } => {
      let id = find(dps, &name)?;
      let removed = dps.remove(id, key.as_bytes())?;
      if json {
        print_json(&serde_json::json!({ "store": id, "key": key, "removed": removed }))?;
      } else if removed {
        print_success(&format!("Deleted '{}'", key));
      } else {
        print_info(&format!("'{}' was not present", key));
      }
    }
    StoreCommand::Clear { name } => {
      let id = find(dps, &name)?;
      dps.clear(id)?;
      if json {
        print_json(&serde_json::json!({ "cleared": name, "id": id }))?;
      } else {
        print_success(&format!("Cleared store '{}'", name));
      }
    }
    StoreCommand::Size { name } => {
      let id = find(dps, &name)?;
      let size = dps.size(id)?;
      if json {
        print_json(&serde_json::json!({ "store": id, "size": size }))?;
      } else {
        println!("{}", size);
      }
    }
    StoreCommand::List { name } => {
      let id = find(dps, &name)?;
      let mut iter = dps.new_iterator(id)?;
      let mut pairs = Vec::new();
      while let Some((key, value)) = iter.next(id)? {
        pairs.push((lossy(&key), lossy(&value)));
      }
      pairs.sort();

      if json {
        let items: Vec<_> = pairs
          .iter()
          .map(|(k, v)| serde_json::json!({ "key": k, "value": v }))
          .collect();
        print_json(&serde_json::json!({ "store": id, "count": items.len(), "items": items }))?;
      } else if pairs.is_empty() {
        print_info(&format!("Store '{}' is empty", name));
      } else {
        for (key, value) in &pairs {
          print_stat(key, value);
        }
      }
    }
  }
  Ok(())
}
