use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::SyncSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Base URL every endpoint path is resolved against
  pub url: String,
  /// Per-request timeout; the engine adds none of its own
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database file (defaults to $XDG_DATA_HOME/shiftsync/offline.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub interval_secs: u64,
  pub settle_delay_ms: u64,
  pub throttle_ms: u64,
  pub max_retries: u32,
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: 30,
      settle_delay_ms: 1000,
      throttle_ms: 100,
      max_retries: 3,
      probe_interval_secs: 10,
    }
  }
}

impl SyncConfig {
  pub fn settings(&self) -> SyncSettings {
    SyncSettings {
      interval: Duration::from_secs(self.interval_secs.max(1)),
      settle_delay: Duration::from_millis(self.settle_delay_ms),
      throttle: Duration::from_millis(self.throttle_ms),
      max_retries: self.max_retries.max(1),
      probe_interval: Duration::from_secs(self.probe_interval_secs.max(1)),
    }
  }
}

fn default_timeout_secs() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shiftsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shiftsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/shiftsync/config.yaml\n\
                 with at least `backend: {{ url: ... }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shiftsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shiftsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the backend API token from the environment.
  ///
  /// Requests go out unauthenticated when SHIFTSYNC_TOKEN is unset.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SHIFTSYNC_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
