//! Application configuration file
//!
//! Where the wallpaper packages live, where the daemon listens and how
//! loudly it logs. Stored as JSON under the user's config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::{config, timing};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_resource_path")]
    pub resource_path: PathBuf,
    /// Archive extracted when the resource root is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_archive: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay between a resource root move and the reload
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(config::APP_DIR)
}

fn default_resource_path() -> PathBuf {
    data_root().join(config::RESOURCE_DIR)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_settle_delay_ms() -> u64 {
    timing::DEFAULT_SETTLE_DELAY_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            resource_path: default_resource_path(),
            bundled_archive: None,
            log_level: default_log_level(),
            settle_delay_ms: default_settle_delay_ms(),
            socket_path: None,
        }
    }
}

impl AppConfig {
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::FILENAME);
        path
    }

    /// Directory holding the durable configuration documents
    pub fn db_dir() -> PathBuf {
        data_root().join(config::DB_DIR)
    }

    /// Load from `path`, writing defaults there first if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, creating default config");
            let config = AppConfig::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON from {:?}", path))?;

        info!(path = %path.display(), resource_path = %config.resource_path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        fs::write(path, json).with_context(|| format!("Failed to write config to {:?}", path))?;

        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Configured socket, or the per-user default
    pub fn socket_path(&self) -> Result<PathBuf> {
        match &self.socket_path {
            Some(path) => Ok(path.clone()),
            None => crate::ipc::default_socket_path(),
        }
    }

    /// Bundled archive, defaulting to one next to the resource root
    pub fn bundled_archive(&self) -> Option<PathBuf> {
        self.bundled_archive.clone().or_else(|| {
            self.resource_path
                .parent()
                .map(|parent| parent.join(config::BUNDLED_ARCHIVE))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.is_file());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "resource_path": "/srv/wallpapers", "log_level": "debug" }"#).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.resource_path, PathBuf::from("/srv/wallpapers"));
        assert_eq!(loaded.log_level, "debug");
        assert_eq!(loaded.settle_delay_ms, timing::DEFAULT_SETTLE_DELAY_MS);
        assert_eq!(
            loaded.bundled_archive(),
            Some(PathBuf::from("/srv").join(config::BUNDLED_ARCHIVE))
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AppConfig {
            socket_path: Some(PathBuf::from("/tmp/player.sock")),
            settle_delay_ms: 50,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.socket_path().unwrap(), PathBuf::from("/tmp/player.sock"));
    }
}
