//! telemetry
//!
//! Tracing subscriber setup for hosts that do not install their own.
//!
//! The library only emits `tracing` events. [`init`] installs a stderr fmt
//! layer filtered by `$STATEPOOL_LOG`, falling back to the configured
//! directive.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::core::config::LoggingConfig;

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "STATEPOOL_LOG";

/// The filter `init` would install.
///
/// A set but unparsable `$STATEPOOL_LOG` is ignored in favour of the
/// configured directive.
pub fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(LOG_ENV)
        .try_from_env()
        .unwrap_or_else(|_| EnvFilter::builder().parse_lossy(&config.filter))
}

/// Install the global subscriber.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(config: &LoggingConfig) -> bool {
    Registry::default()
        .with(filter(config))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_is_used_without_env() {
        std::env::remove_var(LOG_ENV);
        let config = LoggingConfig {
            filter: "statepool=debug".to_string(),
            log_cycles: true,
        };
        assert_eq!(filter(&config).to_string(), "statepool=debug");
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }
}
