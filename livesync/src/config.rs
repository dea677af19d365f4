//! Runtime configuration read from the environment.
//!
//! Every value has a typed default, so an empty environment yields a working
//! local setup. Unparseable numeric or boolean values fall back to their
//! default; malformed URLs are rejected.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::net::backoff::{Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use crate::net::connection::ConnectionOptions;

pub const DEFAULT_SOCKET_URL: &str = "ws://127.0.0.1:4000/socket";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:4000/api";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a ws:// or wss:// url, got {value:?}")]
    InvalidSocketUrl { key: &'static str, value: String },
    #[error("{key} must be an http:// or https:// url, got {value:?}")]
    InvalidApiUrl { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub socket_url: String,
    pub api_url: String,
    pub auto_connect: bool,
    pub reconnection: bool,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub reconnect_delay_max_ms: u64,
    pub connect_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_owned(),
            api_url: DEFAULT_API_URL.to_owned(),
            auto_connect: true,
            reconnection: true,
            reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_delay_ms: duration_ms(DEFAULT_BASE_DELAY),
            reconnect_delay_max_ms: duration_ms(DEFAULT_MAX_DELAY),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Read `HRSYNC_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL variable is set to something with the wrong
    /// scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL value has the wrong scheme.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let config = Self {
            socket_url: parse("HRSYNC_SOCKET_URL").unwrap_or(defaults.socket_url),
            api_url: parse("HRSYNC_API_URL").unwrap_or(defaults.api_url),
            auto_connect: parse("HRSYNC_AUTO_CONNECT")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.auto_connect),
            reconnection: parse("HRSYNC_RECONNECTION")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.reconnection),
            reconnect_attempts: parse_or(parse("HRSYNC_RECONNECT_ATTEMPTS"), defaults.reconnect_attempts),
            reconnect_delay_ms: parse_or(parse("HRSYNC_RECONNECT_DELAY_MS"), defaults.reconnect_delay_ms),
            reconnect_delay_max_ms: parse_or(parse("HRSYNC_RECONNECT_DELAY_MAX_MS"), defaults.reconnect_delay_max_ms),
            connect_timeout_secs: parse_or(parse("HRSYNC_CONNECT_TIMEOUT_SECS"), defaults.connect_timeout_secs),
            http_timeout_secs: parse_or(parse("HRSYNC_HTTP_TIMEOUT_SECS"), defaults.http_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check URL schemes.
    ///
    /// # Errors
    ///
    /// Returns the first URL with an unexpected scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.socket_url.starts_with("ws://") || self.socket_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidSocketUrl { key: "HRSYNC_SOCKET_URL", value: self.socket_url.clone() });
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl { key: "HRSYNC_API_URL", value: self.api_url.clone() });
        }
        Ok(())
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        let base = Duration::from_millis(self.reconnect_delay_ms);
        Backoff {
            base,
            max: Duration::from_millis(self.reconnect_delay_max_ms).max(base),
            max_attempts: self.reconnect_attempts,
        }
    }

    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            auto_connect: self.auto_connect,
            reconnection: self.reconnection,
            backoff: self.backoff(),
            timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
