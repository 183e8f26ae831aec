use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub origin: OriginConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
  /// Base URL of the hosted application's origin
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Directory holding the cache database (defaults to the platform data dir)
  #[serde(default)]
  pub data_dir: Option<PathBuf>,
  /// Period of the recurring obsolete-tier sweep
  #[serde(default = "default_sweep_hours")]
  pub sweep_interval_hours: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      data_dir: None,
      sweep_interval_hours: default_sweep_hours(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Period of the connectivity probe that triggers deferred replays
  #[serde(default = "default_probe_secs")]
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_secs(),
    }
  }
}

fn default_sweep_hours() -> u64 {
  24
}

fn default_probe_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./satchel.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/satchel/config.yaml
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
        "No configuration file found. Create one at ~/.config/satchel/config.yaml\n\
                 with at least an `origin.url` entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("satchel.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("satchel").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn sweep_period(&self) -> Duration {
    Duration::from_secs(self.cache.sweep_interval_hours * 60 * 60)
  }

  pub fn probe_period(&self) -> Duration {
    Duration::from_secs(self.sync.probe_interval_secs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config: Config = serde_yaml::from_str("origin:\n  url: https://shop.example\n").unwrap();

    assert_eq!(config.origin.url, "https://shop.example");
    assert_eq!(config.cache.sweep_interval_hours, 24);
    assert_eq!(config.sync.probe_interval_secs, 30);
    assert!(config.cache.data_dir.is_none());
  }

  #[test]
  fn test_overrides_are_honored() {
    let yaml = "origin:\n  url: https://shop.example\ncache:\n  sweep_interval_hours: 1\nsync:\n  probe_interval_secs: 5\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.sweep_period(), Duration::from_secs(3600));
    assert_eq!(config.probe_period(), Duration::from_secs(5));
  }
}
