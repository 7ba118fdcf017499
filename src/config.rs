//! Configuration file for ~/.gatorconfig.json.
//!
//! The file is optional: a missing or empty file yields `Config::default()`.
//! Unknown keys are kept as-is and written back on save, with a warning
//! logged for each so typos are visible. `register` and `login` rewrite the
//! file to record the current user.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::DEFAULT_FETCH_TIMEOUT;

/// File name of the config, relative to `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Cannot locate the home directory: HOME is not set")]
    NoHome,
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Persisted application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` means `$HOME/.config/gator/gator.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Name of the logged-in user, set by `register` and `login`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// Per-request deadline for feed fetches, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,

    /// Keys gator does not use, preserved so saving never drops them.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Connection-string key written by older Postgres-backed gator builds.
const LEGACY_DB_URL_KEY: &str = "db_url";

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `$HOME/.gatorconfig.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from a JSON file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid JSON → `Err(ConfigError::Parse)` with line and column
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading so a corrupt file cannot exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config: Config = serde_json::from_str(&content)?;
        for key in config.extra.keys() {
            if key == LEGACY_DB_URL_KEY {
                tracing::warn!(
                    key = %key,
                    "Ignoring Postgres connection URL; set db_path to choose the SQLite file"
                );
            } else {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }
        tracing::debug!(
            path = %path.display(),
            user = config.current_user_name.as_deref().unwrap_or("<none>"),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the config to `path` atomically.
    ///
    /// The JSON is written to a sibling temp file, synced, then renamed over
    /// `path`, so a crash never leaves a half-written config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self)?;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", nanos));

        let write_temp = || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(&json)?;
            file.write_all(b"\n")?;
            file.sync_all()
        };

        if let Err(e) = write_temp().and_then(|()| std::fs::rename(&temp_path, path)) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Record `name` as the current user and persist the change.
    pub fn set_current_user(&mut self, name: &str, path: &Path) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.save(path)
    }

    /// Database file to open, falling back to `$HOME/.config/gator/gator.db`.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => home_dir().map(|home| home.join(".config").join("gator").join("gator.db")),
        }
    }

    /// Per-fetch deadline; zero or unset means the default of 30 seconds.
    pub fn fetch_timeout(&self) -> Duration {
        match self.fetch_timeout_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_FETCH_TIMEOUT,
        }
    }
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .ok_or(ConfigError::NoHome)
}

// ============================================================================
// Tests
// ============================================================================
