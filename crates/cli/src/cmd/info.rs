//! Info command implementation.
//!
//! Reports where the config came from, which substrate and container layout
//! are in use, and the identity this process presents to lock holders.

use std::path::Path;

use anyhow::Result;
use dps_lib::config::{BackendKind, ConfigSource};
use dps_platform::Platform;

use super::Session;
use crate::output::{OutputFormat, print_info, print_json, print_stat};

fn describe_source(source: &ConfigSource) -> String {
  match source {
    ConfigSource::Explicit(path) => format!("{} (--config)", path.display()),
    ConfigSource::Env(path) => format!("{} ($DPS_CONFIG)", path.display()),
    ConfigSource::UserFile(path) => path.display().to_string(),
    ConfigSource::Defaults => "built-in defaults".to_string(),
  }
}

pub fn cmd_info(config: Option<&Path>, output: OutputFormat) -> Result<()> {
  let session = Session::open(config)?;
  let dps = &session.dps;
  let machine = dps.machine_details();
  let platform = Platform::current().map(|p| p.triple());
  let data_dir = match session.config.backend {
    BackendKind::File => Some(session.config.resolved_data_dir()),
    BackendKind::Memory => None,
  };

  if output.is_json() {
    let json = serde_json::json!({
      "version": env!("CARGO_PKG_VERSION"),
      "config": describe_source(&session.source),
      "product": dps.product_name(),
      "capability": dps.capability().as_str(),
      "strategy": dps.strategy(),
      "data_dir": data_dir,
      "servers": session.config.servers,
      "pid": dps.identity().pid,
      "machine": machine,
      "platform": platform,
    });
    return print_json(&json);
  }

  print_info(&format!("dps v{}", env!("CARGO_PKG_VERSION")));
  print_stat("Config", &describe_source(&session.source));
  print_stat("Product", dps.product_name());
  print_stat("Capability", dps.capability().as_str());
  print_stat("Strategy", dps.strategy());
  if let Some(dir) = &data_dir {
    print_stat("Data dir", &dir.display().to_string());
  }
  if !session.config.servers.is_empty() {
    print_stat("Servers", &session.config.servers.join(", "));
  }
  println!();
  print_stat("Pid", &dps.identity().pid.to_string());
  print_stat("Hostname", &machine.hostname);
  print_stat("OS", &machine.os_version);
  print_stat("Arch", &machine.arch);
  if let Some(triple) = &platform {
    print_stat("Platform", triple);
  }
  Ok(())
}
