use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(String),

  #[error("failed to read config file {path}: {source}")]
  Read {
    path: String,
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: String,
    source: serde_yaml::Error,
  },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub list: ListConfig,
  /// Quiet period for coalescing rapid field edits (cafe address lookups)
  #[serde(default = "default_coalesce_ms")]
  pub coalesce_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the REST data API
  pub base_url: Url,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  /// Base URL of the object-storage service
  pub base_url: Url,
  /// Bucket that post images are uploaded into
  #[serde(default = "default_bucket")]
  pub bucket: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListConfig {
  /// Window size for the first fetch of an incremental list
  #[serde(default = "default_window")]
  pub initial_window: usize,
  /// How much the window grows per accepted scroll trigger
  #[serde(default = "default_window")]
  pub page_increment: usize,
  /// Scroll distance from the bottom (px) that triggers the next page
  #[serde(default = "default_threshold")]
  pub scroll_threshold_px: u32,
}

fn default_window() -> usize {
  8
}

fn default_threshold() -> u32 {
  10
}

fn default_bucket() -> String {
  "posts".to_string()
}

fn default_coalesce_ms() -> u64 {
  1000
}

impl Default for ListConfig {
  fn default() -> Self {
    Self {
      initial_window: default_window(),
      page_increment: default_window(),
      scroll_threshold_px: default_threshold(),
    }
  }
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      base_url: Url::parse("http://localhost:5001").expect("static url"),
      bucket: default_bucket(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig {
        base_url: Url::parse("http://localhost:5000").expect("static url"),
      },
      storage: StorageConfig::default(),
      list: ListConfig::default(),
      coalesce_delay_ms: default_coalesce_ms(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cafeboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cafeboard/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ConfigError::NotFound(p.display().to_string()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(ConfigError::NotFound(
        "no cafeboard.yaml in the current directory or XDG config dir".to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("cafeboard.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cafeboard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.display().to_string(),
      source: e,
    })?;

    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
      path: path.display().to_string(),
      source: e,
    })
  }
}
