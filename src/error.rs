//! Error types for dns-sinkhole
//!
//! Runtime DNS errors ([`DnsError`]) and startup file errors ([`LoadError`])
//! live in [`crate::dns::error`]; this module wraps them together with
//! configuration errors for [`crate::service::Sinkhole`].

use std::io;

use thiserror::Error;

use crate::dns::error::{DnsError, LoadError};

/// Top-level error type for dns-sinkhole
#[derive(Debug, Error)]
pub enum SinkholeError {
    /// Configuration errors (file parsing, validation, environment)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Blacklist or override file could not be loaded
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// DNS runtime errors
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}
