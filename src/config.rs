use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub endpoint: EndpointConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
  /// Collection URL, e.g. https://api.example.com/todos
  pub url: String,
  /// Identifying field of each item
  #[serde(default = "default_id_field")]
  pub id_field: String,
}

fn default_id_field() -> String {
  restbind::resource::DEFAULT_ID_FIELD.to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
  /// Every call goes to the server
  #[default]
  None,
  /// Snapshot kept for the life of the process
  Memory,
  /// Snapshot kept in the on-disk store across runs
  Persistent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub mode: CacheMode,
  /// Seconds a snapshot stays fresh
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: i64,
  /// Store key; derived from the endpoint URL if not set
  pub key: Option<String>,
  /// SQLite file; defaults to the user data directory
  pub path: Option<PathBuf>,
}

fn default_ttl_secs() -> i64 {
  300
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      mode: CacheMode::default(),
      ttl_secs: default_ttl_secs(),
      key: None,
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.ttl_secs)
  }
}

impl Config {
  /// Configuration for a bare URL with default settings.
  pub fn for_url(url: &str) -> Self {
    Self {
      endpoint: EndpointConfig {
        url: url.to_string(),
        id_field: default_id_field(),
      },
      cache: CacheConfig::default(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./restbind.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/restbind/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Option<Self>> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    path.map(|p| Self::load_from_path(&p)).transpose()
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("restbind.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    let xdg_path = dirs::config_dir()?.join("restbind").join("config.yaml");
    xdg_path.exists().then_some(xdg_path)
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("endpoint:\n  url: http://localhost/todos\n").unwrap();
    assert_eq!(config.endpoint.id_field, "id");
    assert_eq!(config.cache.mode, CacheMode::None);
    assert_eq!(config.cache.ttl(), chrono::Duration::minutes(5));
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
endpoint:
  url: http://localhost/users
  id_field: uid
cache:
  mode: persistent
  ttl_secs: 60
  key: users
  path: /tmp/restbind.db
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.endpoint.id_field, "uid");
    assert_eq!(config.cache.mode, CacheMode::Persistent);
    assert_eq!(config.cache.ttl_secs, 60);
    assert_eq!(config.cache.key.as_deref(), Some("users"));
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/restbind.db")));
  }

  #[test]
  fn test_unknown_cache_mode_fails() {
    let yaml = "endpoint:\n  url: http://x\ncache:\n  mode: sometimes\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_missing_explicit_file_fails() {
    let err = Config::load(Some(Path::new("/nonexistent/restbind.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
