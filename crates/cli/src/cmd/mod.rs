mod info;
mod lock;
mod store;
mod ttl;

use std::path::Path;

use anyhow::{Context, Result};
use dps_lib::config::ConfigSource;
use dps_lib::{Dps, DpsConfig};
use tracing::debug;

pub use info::cmd_info;
pub use lock::{LockCommand, cmd_lock};
pub use store::{StoreCommand, cmd_store};
pub use ttl::{TtlCommand, cmd_ttl};

/// Everything a command needs: the resolved config and an open substrate.
pub struct Session {
  pub config: DpsConfig,
  pub source: ConfigSource,
  pub dps: Dps,
}

impl Session {
  pub fn open(config_path: Option<&Path>) -> Result<Self> {
    let (config, source) = DpsConfig::load(config_path).context("Failed to load config")?;
    debug!(?source, backend = ?config.backend, capability = %config.capability, "config resolved");

    let backend = config.open_backend().context("Failed to open substrate")?;
    let dps = Dps::with_options(backend, config.options()).context("Failed to initialise store layer")?;
    Ok(Self { config, source, dps })
  }
}
