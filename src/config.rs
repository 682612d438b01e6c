use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::utils::{self, RunMode};

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Time assigned to quick-added tasks when none is given.
    #[serde(default = "default_task_time")]
    pub default_task_time: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            default_task_time: default_task_time(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

fn default_database_path() -> String {
    Config::default_database_path_for_mode(RunMode::Prod)
}

fn default_task_time() -> String {
    "09:00".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

impl Config {
    /// Load configuration from file, or create default if missing.
    /// The run mode selects the config and database locations.
    pub fn load_with_mode(mode: RunMode) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(mode)?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let mut config: Config = toml::from_str(&contents)?;

            // Ensure database path matches the mode (in case the config
            // file was copied between prod and dev)
            config.database_path = Self::default_database_path_for_mode(mode);

            Ok(config)
        } else {
            let mut config = Config::default();
            config.database_path = Self::default_database_path_for_mode(mode);
            config.save_with_mode(mode)?;
            Ok(config)
        }
    }

    /// Load configuration from file, using production mode
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_mode(RunMode::Prod)
    }

    /// Save configuration to file
    pub fn save_with_mode(&mut self, mode: RunMode) -> Result<(), ConfigError> {
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        let config_path = Self::get_config_path(mode)?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {e}")))?;

        fs::write(&config_path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(mode: RunMode) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(mode).ok_or_else(|| {
            ConfigError::ConfigDirError("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("config.toml"))
    }

    /// Database path with `~` expanded
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    fn default_database_path_for_mode(mode: RunMode) -> String {
        if let Some(data_dir) = utils::get_data_dir(mode) {
            data_dir.join("roozane.db").to_string_lossy().to_string()
        } else {
            match mode {
                RunMode::Dev => "~/.roozane-dev/roozane.db".to_string(),
                RunMode::Prod => "~/.roozane/roozane.db".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.default_task_time, "09:00");
        assert!(!config.database_path.is_empty());
        assert_eq!(config.config_version, Some(CURRENT_CONFIG_VERSION));
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let config: Config = toml::from_str("default_task_time = \"08:30\"\nlegacy_key = 1\n").unwrap();
        assert_eq!(config.default_task_time, "08:30");
    }
}
