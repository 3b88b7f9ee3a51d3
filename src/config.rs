//! Configuration management for the chain store

use crate::error::{Result, StoreError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Upper bound on concurrently open connections, streaming cursors included.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_wal")]
    pub wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            wal: default_wal(),
        }
    }
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(StoreError::Config(
                "database.path must be set in config.toml".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(StoreError::Config(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads the configuration at `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let config_str = match fs::read_to_string(path.as_ref()) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str).map_err(|e| StoreError::Config(e.to_string()))?
    };

    config.database.validate()?;
    Ok(config)
}

fn default_db_path() -> String {
    "./data/chain.db".to_string()
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_wal() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.database.path, "./data/chain.db");
        assert_eq!(config.database.pool_size, 8);
        assert!(config.database.wal);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(&file, "[database]\npath = \"/tmp/x.db\"\npool_size = 2\n").unwrap();

        let config = load_config(&file).unwrap();
        assert_eq!(config.database.path, "/tmp/x.db");
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(&file, "[database]\npool_size = 0\n").unwrap();

        assert!(matches!(load_config(&file), Err(StoreError::Config(_))));
    }
}
