//! Server configuration.

use std::path::Path;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "UTTT_CONFIG_FILE";

/// Configuration for the session server and its store.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_database_path")]
    database_path: String,

    /// Seconds between background flushes of each resident game.
    #[serde(default = "default_flush_interval_secs")]
    flush_interval_secs: u64,

    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    log_filter: String,
}

#[instrument]
fn default_database_path() -> String {
    "uttt.db".to_string()
}

#[instrument]
fn default_flush_interval_secs() -> u64 {
    60
}

#[instrument]
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            flush_interval_secs: default_flush_interval_secs(),
            log_filter: default_log_filter(),
        }
    }
}

impl ServerConfig {
    /// Loads the file named by `UTTT_CONFIG_FILE`, or the defaults when the
    /// variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the named file cannot be read or parsed.
    #[instrument]
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_FILE_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Loads `path` if given, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument]
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(database_path = %config.database_path, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text does not parse or a value is out of
    /// range.
    #[instrument(skip(content))]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.flush_interval_secs == 0 {
            return Err(ConfigError::new(
                "flush_interval_secs must be at least 1".to_string(),
            ));
        }
        if config.database_path.is_empty() {
            return Err(ConfigError::new("database_path must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Interval between background flushes.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
