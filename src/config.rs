//! Configuration file parser for ~/.config/wastewise/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
//! The database file name is fixed; only its directory can be configured.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::storage::{SeedPolicy, StoreOptions};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database file. Defaults to the config directory.
    /// A leading `~` expands to the home directory.
    pub data_dir: Option<PathBuf>,

    /// Maximum pooled SQLite connections (at least 1).
    pub max_connections: u32,

    /// Milliseconds SQLite waits on a locked database.
    pub busy_timeout_ms: u64,

    /// When default content is written: "marker", "threshold" or "never".
    pub seed_policy: SeedPolicy,

    /// `tracing` filter used when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_connections: 5,
            busy_timeout_ms: 5000,
            seed_policy: SeedPolicy::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "data_dir",
        "max_connections",
        "busy_timeout_ms",
        "seed_policy",
        "log_filter",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            seed_policy = ?config.seed_policy,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Resolve the data directory, falling back to `default_dir`.
    pub fn data_dir_or(&self, default_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(dir) => expand_home(dir, dirs::home_dir().as_deref()),
            None => default_dir.to_path_buf(),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.max_connections.max(1),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            seed_policy: self.seed_policy,
        }
    }
}

/// Replace a leading `~` component with `home`. Paths like `~user/x` and a
/// missing home directory leave the path untouched.
fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

// ============================================================================
// Tests
// ============================================================================
