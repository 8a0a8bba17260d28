//! Configuration loading
//!
//! Settings come from an optional TOML file at `$AVCO_CONFIG` or
//! `<config_home>/avco/config.toml`. A missing file means defaults.
//! The database path can be overridden by `AVCO_DB` and by `--db`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;

pub const CONFIG_ENV: &str = "AVCO_CONFIG";
pub const DB_ENV: &str = "AVCO_DB";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger database; `None` uses ~/.avco/ledger.db
    pub database_path: Option<PathBuf>,
    /// How long a writer waits for another writer's lock
    pub busy_timeout_ms: u64,
    /// Decimal places shown for amounts in tables
    pub display_decimals: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            display_decimals: 2,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when no
    /// file exists.
    pub fn load() -> Result<Self> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                tracing::debug!("No config file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("Failed to parse TOML")?;
        Ok(config)
    }

    /// Database path to open: the command-line flag wins, then `AVCO_DB`,
    /// then the config file. `None` means the default location.
    pub fn resolve_db_path(&self, cli_override: Option<PathBuf>) -> Option<PathBuf> {
        cli_override
            .or_else(|| {
                std::env::var_os(DB_ENV)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .or_else(|| self.database_path.clone())
    }
}

/// Location of the config file, if one can be determined
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    dir_spec::config_home().map(|dir| dir.join("avco").join("config.toml"))
}
