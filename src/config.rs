use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::denormalize::DEFAULT_MAX_DEPTH;
use crate::engine::DEFAULT_SOURCE;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Marker identifying lifecycle events meant for this engine
  #[serde(deserialize_with = "deserialize_trimmed")]
  pub source: String,
  pub logging: LoggingConfig,
  pub storage: StorageConfig,
  pub denormalize: DenormalizeConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      source: DEFAULT_SOURCE.to_string(),
      logging: LoggingConfig::default(),
      storage: StorageConfig::default(),
      denormalize: DenormalizeConfig::default(),
    }
  }
}

fn deserialize_trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let s = String::deserialize(deserializer)?;
  Ok(s.trim().to_string())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter directive, e.g. "warn" or "apistate=debug"
  pub level: String,
  pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "warn".to_string(),
      file: FileLoggingConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
  pub enabled: bool,
  /// Defaults to the platform data directory
  pub dir: Option<PathBuf>,
}

impl FileLoggingConfig {
  pub fn resolved_dir(&self) -> PathBuf {
    self.dir.clone().unwrap_or_else(|| {
      dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("apistate")
        .join("logs")
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Persist snapshots to SQLite
  pub enabled: bool,
  /// Defaults to the platform data directory
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DenormalizeConfig {
  pub max_depth: usize,
}

impl Default for DenormalizeConfig {
  fn default() -> Self {
    Self {
      max_depth: DEFAULT_MAX_DEPTH,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./apistate.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/apistate/config.yaml
  ///
  /// Without any file the defaults are used.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("apistate.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("apistate").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    // An empty file deserializes to null, not to the defaults.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    if config.source.is_empty() {
      return Err(eyre!("Invalid config file {}: source must not be empty", path.display()));
    }

    Ok(config)
  }
}
