//! TOML-based configuration.
//!
//! Stored at the platform config dir (`config.toml`). Every field has a
//! default, so a missing file or a partial file is valid.

use crate::constants::ENFORCEMENT_DEBOUNCE;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine project directories")]
    NoProjectDirs,

    #[error("Failed to read configuration from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write configuration to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Remote backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    /// Bearer token for the signed-in user. Falls back to `api_key`.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Policy enforcement settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl EnforcementConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the SQLite store. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Flat JSON file kept mirrored on every write. Defaults to
    /// `<data_dir>/legacy_store.json`.
    #[serde(default)]
    pub legacy_store: Option<PathBuf>,
    #[serde(default)]
    pub enforcement: EnforcementConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

fn default_debounce_ms() -> u64 {
    u64::try_from(ENFORCEMENT_DEBOUNCE.as_millis()).unwrap_or(500)
}

fn default_timeout_secs() -> u64 {
    10
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("com", "focussphere", "FocusSphere").ok_or(ConfigError::NoProjectDirs)
}

impl AppConfig {
    /// Default config file location.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolved data directory.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }

    /// Resolved legacy flat store path.
    pub fn resolve_legacy_store(&self, data_dir: &Path) -> PathBuf {
        self.legacy_store
            .clone()
            .unwrap_or_else(|| data_dir.join("legacy_store.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.enforcement.debounce(), Duration::from_millis(500));
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_partial_config() {
        let config = AppConfig::parse(
            r#"
            data_dir = "/tmp/focus"

            [enforcement]
            debounce_ms = 250

            [remote]
            url = "https://example.supabase.co"
            api_key = "anon"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/focus")));
        assert_eq!(config.enforcement.debounce_ms, 250);
        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "https://example.supabase.co");
        assert_eq!(remote.timeout_secs, 10);
        assert!(remote.access_token.is_none());
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(AppConfig::parse("enforcement = 3").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = AppConfig {
            data_dir: Some(dir.path().to_path_buf()),
            enforcement: EnforcementConfig { debounce_ms: 100 },
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_legacy_store_default_path() {
        let config = AppConfig::default();
        let path = config.resolve_legacy_store(Path::new("/data"));
        assert_eq!(path, PathBuf::from("/data/legacy_store.json"));
    }
}
