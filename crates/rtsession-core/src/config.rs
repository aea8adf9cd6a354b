//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default unsolicited-disconnect bound before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default persistence key for the session token.
pub const DEFAULT_SESSION_KEY: &str = "nk.session";

/// Default persistence key for the device id.
pub const DEFAULT_DEVICE_KEY: &str = "nk.deviceid";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Connection and reconnect settings for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub server_key: String,
    pub use_ssl: bool,

    /// Upper bound of the reconnect counter.
    pub max_reconnect_attempts: u32,

    /// Length of one backoff time unit in milliseconds.
    ///
    /// Defaults to 1 ms, so the first retry waits 600 ms. Set 1000 for
    /// whole-second units, where the first retry waits ten minutes.
    pub reconnect_unit_ms: u64,

    /// Store key holding the session token.
    pub session_key: String,

    /// Store key holding the device id.
    pub device_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7350,
            server_key: "defaultkey".to_string(),
            use_ssl: false,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_unit_ms: 1,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            device_key: DEFAULT_DEVICE_KEY.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at `host:port` with defaults elsewhere.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Default config overlaid with `RTSESSION_*` environment variables.
    ///
    /// Recognised: `RTSESSION_HOST`, `RTSESSION_PORT`, `RTSESSION_SERVER_KEY`,
    /// `RTSESSION_SSL`, `RTSESSION_MAX_RECONNECT_ATTEMPTS`,
    /// `RTSESSION_RECONNECT_UNIT_MS`.
    ///
    /// # Errors
    /// Returns error if a numeric or boolean variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup("RTSESSION_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("RTSESSION_PORT") {
            config.port = parse("RTSESSION_PORT", port)?;
        }
        if let Some(key) = lookup("RTSESSION_SERVER_KEY") {
            config.server_key = key;
        }
        if let Some(ssl) = lookup("RTSESSION_SSL") {
            config.use_ssl = parse("RTSESSION_SSL", ssl)?;
        }
        if let Some(max) = lookup("RTSESSION_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = parse("RTSESSION_MAX_RECONNECT_ATTEMPTS", max)?;
        }
        if let Some(unit) = lookup("RTSESSION_RECONNECT_UNIT_MS") {
            config.reconnect_unit_ms = parse("RTSESSION_RECONNECT_UNIT_MS", unit)?;
        }

        Ok(config)
    }

    /// Use TLS when talking to the server.
    #[must_use]
    pub const fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    #[must_use]
    pub fn with_server_key(mut self, key: impl Into<String>) -> Self {
        self.server_key = key.into();
        self
    }

    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, max: u32) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    #[must_use]
    pub fn with_reconnect_unit(mut self, unit: Duration) -> Self {
        self.reconnect_unit_ms = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Backoff time unit as a `Duration`.
    #[must_use]
    pub const fn reconnect_unit(&self) -> Duration {
        Duration::from_millis(self.reconnect_unit_ms)
    }

    /// Base URL of the server.
    #[must_use]
    pub fn endpoint(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
