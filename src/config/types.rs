//! Configuration types for dns-sinkhole
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a valid configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// UDP port to serve DNS on
    pub listen_port: u16,

    /// Upstream resolver (`ip:port`)
    pub upstream: String,

    /// Upstream exchange timeout in seconds
    pub upstream_timeout_secs: u64,

    /// Sorted blacklist, one domain per line
    pub blacklist_path: PathBuf,

    /// Static `domain ipv4` overrides
    pub override_path: PathBuf,

    /// Answer A queries from the override file
    pub enable_overrides: bool,

    /// Debug logging and per-query logs
    pub debug: bool,

    /// Port of the `/metrics` HTTP endpoint
    pub metrics_port: u16,

    /// Log output format: "json" or "text"
    pub log_format: String,

    /// Interval between cache expiration sweeps, in seconds
    pub cache_sweep_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 53,
            upstream: "1.1.1.1:53".into(),
            upstream_timeout_secs: 2,
            blacklist_path: PathBuf::from("data/blacklist.txt"),
            override_path: PathBuf::from("data/override.txt"),
            enable_overrides: false,
            debug: false,
            metrics_port: 9090,
            log_format: "text".into(),
            cache_sweep_secs: 30,
        }
    }
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::ValidationError(
                "listen_port must be greater than 0".into(),
            ));
        }

        if self.metrics_port == 0 {
            return Err(ConfigError::ValidationError(
                "metrics_port must be greater than 0".into(),
            ));
        }

        if self.listen_port == self.metrics_port {
            return Err(ConfigError::ValidationError(format!(
                "listen_port and metrics_port must differ (both {})",
                self.listen_port
            )));
        }

        if self.upstream.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "upstream must be an ip:port address, got '{}'",
                self.upstream
            )));
        }

        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "upstream_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.cache_sweep_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache_sweep_secs must be greater than 0".into(),
            ));
        }

        if !matches!(self.log_format.as_str(), "json" | "text") {
            return Err(ConfigError::ValidationError(format!(
                "log_format must be 'json' or 'text', got '{}'",
                self.log_format
            )));
        }

        Ok(())
    }

    /// Upstream exchange timeout as Duration
    #[must_use]
    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Cache sweep interval as Duration
    #[must_use]
    pub const fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    /// Address the DNS server binds to
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.listen_port))
    }

    /// Address the metrics endpoint binds to
    #[must_use]
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.metrics_port))
    }
}
