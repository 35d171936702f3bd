//! Session manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the poll interval (milliseconds).
pub const POLL_INTERVAL_ENV: &str = "TERMINAL_POLL_INTERVAL_MS";
/// Environment variable overriding the post-command poll delay (milliseconds).
pub const ECHO_POLL_DELAY_ENV: &str = "TERMINAL_ECHO_POLL_DELAY_MS";

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_ECHO_POLL_DELAY_MS: u64 = 150;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timing knobs for the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Delay between regular polls of a terminal.
    pub poll_interval_ms: u64,
    /// Delay before the extra poll issued after a command. Zero disables it.
    pub echo_poll_delay_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            echo_poll_delay_ms: DEFAULT_ECHO_POLL_DELAY_MS,
        }
    }
}

impl ManagerConfig {
    /// Regular poll interval, never zero.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Delay of the post-command poll, `None` when disabled.
    #[must_use]
    pub fn echo_poll_delay(&self) -> Option<Duration> {
        (self.echo_poll_delay_ms > 0).then(|| Duration::from_millis(self.echo_poll_delay_ms))
    }

    /// Parse from a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON for this type.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `TERMINAL_POLL_INTERVAL_MS` and
    /// `TERMINAL_ECHO_POLL_DELAY_MS`.
    ///
    /// # Errors
    /// Returns error if a variable is set but not an integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(POLL_INTERVAL_ENV) {
            config.poll_interval_ms = parse_millis(POLL_INTERVAL_ENV, &value)?;
        }
        if let Some(value) = lookup(ECHO_POLL_DELAY_ENV) {
            config.echo_poll_delay_ms = parse_millis(ECHO_POLL_DELAY_ENV, &value)?;
        }
        Ok(config)
    }
}

fn parse_millis(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}
