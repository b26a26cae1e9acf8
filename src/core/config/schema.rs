//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Values are validated after parsing: the log filter must be a non-empty,
//! parseable `tracing` filter directive.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use super::ConfigError;

/// Pool configuration.
///
/// # Example
///
/// ```toml
/// autostart = true
///
/// [bindings]
/// enforce_defaults = false
///
/// [logging]
/// filter = "warn"
/// log_cycles = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Start the reactor as soon as the pool is constructed.
    pub autostart: bool,

    /// Defaults applied to new bindings.
    pub bindings: BindingDefaults,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            autostart: true,
            bindings: BindingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()
    }
}

/// Defaults for consumer bindings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BindingDefaults {
    /// Seed defaults even when the store already holds a value.
    pub enforce_defaults: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `STATEPOOL_LOG` is unset.
    pub filter: String,

    /// Emit one `debug!` event per reactor cycle.
    pub log_cycles: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            log_cycles: false,
        }
    }
}

impl LoggingConfig {
    /// Validate the filter directive.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the filter is empty or cannot
    /// be parsed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "logging.filter cannot be empty".to_string(),
            ));
        }

        EnvFilter::try_new(&self.filter).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "invalid logging.filter '{}': {}",
                self.filter, e
            ))
        })?;

        Ok(())
    }
}
