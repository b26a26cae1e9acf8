//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order, first hit wins:
//! 1. An explicit path passed to [`Config::load`] (must exist)
//! 2. `$STATEPOOL_CONFIG` if set and the file exists
//! 3. `$XDG_CONFIG_HOME/statepool/config.toml`
//! 4. `~/.statepool/config.toml` (canonical write location)
//!
//! No file found means defaults.
//!
//! # Example
//!
//! ```no_run
//! use statepool::core::config::Config;
//! use statepool::engine::Pool;
//!
//! let config = Config::load(None).unwrap();
//! if let Some(path) = config.loaded_from() {
//!     println!("config: {}", path.display());
//! }
//! let pool = Pool::new(config.pool);
//! assert!(pool.is_listening());
//! ```

pub mod schema;

pub use schema::{BindingDefaults, LoggingConfig, PoolConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "STATEPOOL_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration and where it came from.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The pool settings.
    pub pool: PoolConfig,
    /// Path of the file the settings were read from, if any.
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `explicit`, or from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit path cannot be read, or if a config
    /// file exists but cannot be parsed or fails validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::search(),
        };

        let Some(path) = path else {
            tracing::debug!("no config file found, using defaults");
            return Ok(Self::default());
        };

        let pool = Self::read(&path)?;
        pool.validate()?;

        tracing::debug!(path = %path.display(), "config loaded");
        Ok(Self {
            pool,
            path: Some(path),
        })
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` (with an empty path) on malformed
    /// input, or `ConfigError::InvalidValue` if validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let pool: PoolConfig = toml::from_str(text).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        pool.validate()?;
        Ok(Self { pool, path: None })
    }

    /// The first existing file among the default locations.
    fn search() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("statepool/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".statepool/config.toml"))
            .filter(|path| path.exists())
    }

    /// Read and parse a config file.
    fn read(path: &Path) -> Result<PoolConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical config path.
    ///
    /// Returns `~/.statepool/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".statepool/config.toml"))
    }

    /// Write `config` atomically to `path`.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, syncs it, then renames it over `path`.
    pub fn write(path: &Path, config: &PoolConfig) -> Result<(), ConfigError> {
        config.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(path = %path.display(), "config written");
        Ok(())
    }

    /// Path of the file the configuration was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
