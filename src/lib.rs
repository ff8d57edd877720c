//! dns-sinkhole: filtering DNS resolver
//!
//! Answers DNS queries over UDP. Domains on a blacklist get NXDOMAIN,
//! everything else is forwarded to one upstream resolver and the answers
//! are cached for their TTL.
//!
//! # Features
//!
//! - **Blacklist**: bloom filter in front of a sorted array; exact,
//!   case-insensitive matching with no false positives
//! - **Response cache**: TTL-bounded, concurrent, with background expiration
//! - **Overrides**: optional static `domain -> IPv4` answers
//! - **Metrics**: latency histograms served on `/metrics`
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dns_sinkhole::dns::{Blacklist, QueryPipeline, ResponseCache, UdpClient, UdpDnsServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Arc::new(QueryPipeline::new(
//!     Arc::new(ResponseCache::new()),
//!     Arc::new(Blacklist::load("data/blacklist.txt")?),
//!     Arc::new(UdpClient::new("1.1.1.1:53")?),
//! ));
//!
//! let server = UdpDnsServer::bind("0.0.0.0:53".parse()?, pipeline).await?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
//! server.run_until_shutdown(shutdown_rx).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types, loading and environment overrides
//! - [`dns`]: Blacklist, cache, upstream client, query pipeline and server
//! - [`error`]: Top-level error types
//! - [`metrics_http`]: Prometheus scrape endpoint
//! - [`service`]: Assembly of the whole resolver from a [`Config`]

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod dns;
pub mod error;
pub mod metrics_http;
pub mod service;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use error::{ConfigError, SinkholeError};
pub use service::Sinkhole;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
