//! Configuration module for dns-sinkhole
//!
//! Configuration comes from an optional JSON file, then environment
//! variable overrides.
//!
//! # Example
//!
//! ```no_run
//! use dns_sinkhole::config::{apply_env_overrides, load_config};
//!
//! let mut config = load_config("/etc/dns-sinkhole/config.json").unwrap();
//! apply_env_overrides(&mut config).unwrap();
//! println!("Serving on port {}", config.listen_port);
//! ```

mod loader;
mod types;

pub use loader::{apply_env_overrides, apply_env_overrides_with, load_config, load_config_str};
pub use types::Config;
