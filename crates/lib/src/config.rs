//! Configuration file and substrate selection.
//!
//! Lookup order for the file: an explicit path, `DPS_CONFIG`, then
//! `config.toml` in the user config directory. A missing file in the
//! default location means defaults; a missing explicit file is an error.
//! `DPS_DATA_DIR` overrides the data directory from any source.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::backend::{BackendError, ContainerCapability, FileBackend, KvBackend, MemoryBackend};
use crate::consts::{
  CONFIG_ENV, CONFIG_FILENAME, DATA_DIR_ENV, DEFAULT_CONTAINER_BUDGET, DEFAULT_MAX_SEGMENT_BYTES, DEFAULT_SLOT_COUNT,
};
use crate::dps::DpsOptions;
use crate::paths;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("Invalid config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("Invalid config: {0}")]
  Invalid(String),

  #[error("Failed to open substrate: {0}")]
  Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  Memory,
  #[default]
  File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DpsConfig {
  pub backend: BackendKind,
  pub capability: ContainerCapability,
  /// Server list of a networked substrate. Reported, not dialled.
  pub servers: Vec<String>,
  pub data_dir: Option<PathBuf>,
  pub slot_count: u32,
  pub container_budget: u32,
  pub max_segment_bytes: usize,
}

impl Default for DpsConfig {
  fn default() -> Self {
    Self {
      backend: BackendKind::default(),
      capability: ContainerCapability::Flat,
      servers: Vec::new(),
      data_dir: None,
      slot_count: DEFAULT_SLOT_COUNT,
      container_budget: DEFAULT_CONTAINER_BUDGET,
      max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
    }
  }
}

/// Where the active config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
  Explicit(PathBuf),
  Env(PathBuf),
  UserFile(PathBuf),
  Defaults,
}

impl DpsConfig {
  pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
    let config: DpsConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&content, path)
  }

  /// Resolves and loads the config, reporting where it came from.
  pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
    if let Some(path) = explicit {
      return Ok((Self::load_file(path)?, ConfigSource::Explicit(path.to_path_buf())));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV)
      && !path.is_empty()
    {
      let path = PathBuf::from(path);
      return Ok((Self::load_file(&path)?, ConfigSource::Env(path)));
    }

    let path = paths::config_dir().join(CONFIG_FILENAME);
    if path.is_file() {
      return Ok((Self::load_file(&path)?, ConfigSource::UserFile(path)));
    }
    debug!(path = ?path, "no config file, using defaults");
    Ok((Self::default(), ConfigSource::Defaults))
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.max_segment_bytes == 0 {
      return Err(ConfigError::Invalid("max_segment_bytes must be positive".to_string()));
    }
    if self.capability == ContainerCapability::Scan {
      if self.slot_count == 0 {
        return Err(ConfigError::Invalid("slot_count must be positive".to_string()));
      }
      // one container is reserved for the slot tracker
      if self.slot_count >= self.container_budget {
        return Err(ConfigError::Invalid(format!(
          "slot_count {} leaves no room in a container budget of {}",
          self.slot_count, self.container_budget
        )));
      }
    }
    Ok(())
  }

  /// `DPS_DATA_DIR`, then the configured directory, then the user data dir.
  pub fn resolved_data_dir(&self) -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
      && !dir.is_empty()
    {
      return PathBuf::from(dir);
    }
    self.data_dir.clone().unwrap_or_else(paths::data_dir)
  }

  pub fn open_backend(&self) -> Result<Arc<dyn KvBackend>, ConfigError> {
    let backend: Arc<dyn KvBackend> = match self.backend {
      BackendKind::Memory => Arc::new(MemoryBackend::with_options(
        self.capability,
        Arc::new(crate::clock::SystemClock),
        self.container_budget,
      )),
      BackendKind::File => Arc::new(FileBackend::with_options(
        self.resolved_data_dir(),
        self.capability,
        self.container_budget,
      )?),
    };
    Ok(backend)
  }

  pub fn options(&self) -> DpsOptions {
    DpsOptions {
      max_segment_bytes: self.max_segment_bytes,
      slot_count: self.slot_count,
      ..DpsOptions::default()
    }
  }
}
