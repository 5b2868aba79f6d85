//! Configuration file handling for ~/.slippymap/config.ini.
//!
//! Settings structs live in [`super::settings`], parsing in
//! [`super::parser`] and serialization in [`super::writer`].

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use super::settings::ConfigFile;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Loads from the default path, returning defaults if it doesn't exist.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`, returning defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Creates the default config file if it doesn't exist and returns its path.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }
}

/// Path to the config directory (~/.slippymap).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".slippymap")
}

/// Path to the config file (~/.slippymap/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::FetchPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp_dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.provider.provider_type = "google".into();
        config.provider.google_key = Some("KEY".into());
        config.provider.google_signing_secret = Some("c2VjcmV0".into());
        config.cache.directory = temp_dir.path().join("tiles");
        config.cache.memory_max_size = 64 * 1024 * 1024;
        config.cache.disk_max_entries = 5000;
        config.cache.retention_hours = 12;
        config.download.timeout = 0;
        config.download.fetch_policy = FetchPolicy::Independent;
        config.download.write_through = false;

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.download.max_latency().is_none());
    }

    #[test]
    fn test_default_limits() {
        let config = ConfigFile::default();
        let memory = config.cache.memory_limits();
        assert_eq!(memory.max_entries, 4096);
        assert_eq!(memory.retention.as_secs(), 720 * 3600);
        assert_eq!(config.cache.disk_limits().max_entries, 0);
        assert_eq!(config.provider.credentials().bing_key, None);
    }

    #[test]
    fn test_config_path_under_home() {
        assert!(config_file_path().ends_with(".slippymap/config.ini"));
    }
}
