//! Logging setup for hosts embedding the recovery engine.
//!
//! The engine itself only emits `tracing` events. Hosts without their own
//! subscriber can install a console one here.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{LoggingError, LoggingResult};

/// Configuration for logging output.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter. If None, `RUST_LOG` is consulted, then INFO.
    pub level: Option<LevelFilter>,
    /// Whether to output logs to console (stderr).
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            console: true,
        }
    }
}

/// Initialize console-only logging with the given level.
pub fn init_console_logging(level: LevelFilter) -> LoggingResult<()> {
    init_logging(LoggingConfig {
        level: Some(level),
        console: true,
    })
}

/// Initialize logging with the given configuration.
///
/// With `console` disabled nothing is installed and tracing macros stay no-ops.
///
/// # Errors
///
/// Returns [`LoggingError::SubscriberInit`] when a global subscriber is
/// already set.
///
/// # Examples
///
/// ```no_run
/// use key_wallet_recovery::logging::{init_logging, LoggingConfig};
/// use key_wallet_recovery::LevelFilter;
///
/// init_logging(LoggingConfig {
///     level: Some(LevelFilter::DEBUG),
///     console: true,
/// })
/// .unwrap();
/// ```
pub fn init_logging(config: LoggingConfig) -> LoggingResult<()> {
    if !config.console {
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(build_env_filter(config.level))
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .try_init()
        .map_err(|e| LoggingError::SubscriberInit(e.to_string()))
}

/// Build the env filter from an explicit level or `RUST_LOG`
fn build_env_filter(level: Option<LevelFilter>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string())),
    }
}
