//! Tracing subscriber setup
//!
//! Drivers call [`init`] once at startup. A non-empty `RUST_LOG` overrides
//! the configured level, so a single run can be traced more verbosely
//! without editing the config file.

use anyhow::bail;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, LOG_LEVELS};

/// Filter built from `logging.level` alone
pub fn config_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    if !LOG_LEVELS.contains(&config.level.as_str()) {
        bail!("unknown log level {:?}", config.level);
    }
    Ok(EnvFilter::try_new(&config.level)?)
}

/// Filter for `config`, with `RUST_LOG` taking precedence when set
pub fn env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => config_filter(config),
    }
}

/// Installs the global fmt subscriber
///
/// # Errors
/// Fails on an unknown level or if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = env_filter(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("cannot install tracing subscriber: {e}"))?;
    debug!(level = %config.level, "Tracing initialized");
    Ok(())
}
