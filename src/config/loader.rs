//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::Config;
use crate::error::ConfigError;

/// Load configuration from a JSON file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: port={}, upstream={}",
        config.listen_port, config.upstream
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Apply environment variable overrides from the process environment
///
/// See [`apply_env_overrides_with`] for the recognised variables.
///
/// # Errors
///
/// Returns `ConfigError` if a variable has an invalid value or the result
/// fails validation.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Apply environment overrides read through `lookup`
///
/// Environment variables:
/// - `UPSTREAM_DNS`: upstream resolver address
/// - `DNS_PORT`: listen port
/// - `DEBUG`: debug logging, enabled only by the exact value `true`
/// - `PROMETHEUS_PORT`: metrics endpoint port
/// - `BLACKLIST_PATH`: blacklist file
/// - `OVERRIDE_PATH`: override file
///
/// # Errors
///
/// Returns `ConfigError::EnvError` for unparsable ports and
/// `ConfigError::ValidationError` if the result is invalid.
pub fn apply_env_overrides_with<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(upstream) = lookup("UPSTREAM_DNS") {
        config.upstream = upstream;
        debug!("Upstream overridden to {}", config.upstream);
    }

    if let Some(port) = lookup("DNS_PORT") {
        config.listen_port = parse_port("DNS_PORT", &port)?;
        debug!("Listen port overridden to {}", config.listen_port);
    }

    if let Some(flag) = lookup("DEBUG") {
        config.debug = flag == "true";
    }

    if let Some(port) = lookup("PROMETHEUS_PORT") {
        config.metrics_port = parse_port("PROMETHEUS_PORT", &port)?;
        debug!("Metrics port overridden to {}", config.metrics_port);
    }

    if let Some(path) = lookup("BLACKLIST_PATH") {
        config.blacklist_path = path.into();
    }

    if let Some(path) = lookup("OVERRIDE_PATH") {
        config.override_path = path.into();
    }

    // Re-validate after overrides
    config.validate()
}

fn parse_port(name: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvError {
        name: name.into(),
        reason: format!("Invalid port: {value}"),
    })
}
