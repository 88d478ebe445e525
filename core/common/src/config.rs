//! Process configuration loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration file layout.
///
/// ```toml
/// [lenda]
/// db_file = "./lenda.db"
/// host = "https://api.example.com"
/// username = "user@example.com"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    lenda: AppConfig,
}

/// Process-wide configuration.
///
/// Constructed once at startup and passed by reference; there is no ambient
/// global configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path of the local store file.
    pub db_file: PathBuf,
    /// Base URL of the remote marketplace API.
    pub host: String,
    /// Username for the remote API.
    pub username: String,
    /// Optional path of a schema descriptor overriding the built-in one.
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Malformed TOML or missing keys
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file '{}': {}", path.display(), e))
        })?;

        let file: ConfigFile = toml::from_str(&raw).map_err(|e| {
            Error::Config(format!("malformed config file '{}': {}", path.display(), e))
        })?;

        Ok(file.lenda)
    }
}
