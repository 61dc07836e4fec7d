//! Persistent settings for the command-line tool
//!
//! Stored as JSON. Missing fields fall back to their defaults, and a
//! missing file at the default location means "all defaults".

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{CheckConfig, MintConfig};

/// Default bit strength for newly minted tokens
pub const DEFAULT_MINT_BITS: u32 = 20;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Settings shared by every command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bits requested by `mint` and `fastmint` when not given
    pub mint_bits: u32,
    pub mint: MintConfig,
    pub check: CheckConfig,
    /// Double-spend database location; `None` uses the data directory
    pub spend_db: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mint_bits: DEFAULT_MINT_BITS,
            mint: MintConfig::default(),
            check: CheckConfig::default(),
            spend_db: None,
        }
    }
}

impl Settings {
    /// Load from `path`, which must exist.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load from `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Configured database path, or the platform default
    #[cfg(feature = "cli")]
    pub fn spend_db_path(&self) -> PathBuf {
        self.spend_db.clone().unwrap_or_else(default_spend_db_path)
    }
}

/// `<config dir>/hashcash/config.json`
#[cfg(feature = "cli")]
pub fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("hashcash").join("config.json")
}

/// `<data dir>/hashcash/spent.db`
#[cfg(feature = "cli")]
pub fn default_spend_db_path() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("hashcash").join("spent.db")
}
