//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the config file and
/// the file substrate.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// File substrate with the given container capability.
  pub fn with_capability(capability: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("dps.toml");
    let content = format!(
      "backend = \"file\"\ncapability = \"{}\"\nslot_count = 32\ndata_dir = {:?}\n",
      capability,
      temp.path().join("data")
    );
    std::fs::write(&config_path, content).unwrap();
    Self { temp, config_path }
  }

  pub fn flat() -> Self {
    Self::with_capability("flat")
  }

  /// A command bound to this environment's config.
  pub fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("dps");
    cmd
      .env_remove("DPS_DATA_DIR")
      .env("DPS_CONFIG", &self.config_path)
      .env("XDG_CONFIG_HOME", self.temp.path().join("config"));
    cmd
  }

  /// Runs `args` expecting success and returns stdout.
  pub fn run(&self, args: &[&str]) -> String {
    let output = self.cmd().args(args).output().unwrap();
    assert!(
      output.status.success(),
      "dps {:?} failed: {}",
      args,
      String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
  }

  pub fn run_json(&self, args: &[&str]) -> serde_json::Value {
    let mut full = args.to_vec();
    full.extend(["--output", "json"]);
    serde_json::from_str(&self.run(&full)).unwrap()
  }
}
