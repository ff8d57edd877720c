//! DNS filtering engine
//!
//! Answers queries from a response cache, refuses blacklisted names with
//! NXDOMAIN and forwards everything else to one upstream resolver.
//!
//! # Architecture
//!
//! ```text
//! Client Query
//!     │
//!     ▼
//! ┌─────────────────┐
//! │   Validation    │ ─── response ──▶ dropped
//! │                 │ ─── opcode != QUERY ──▶ NOTIMP
//! │                 │ ─── != 1 question ──▶ FORMERR
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Cache       │ ─── Hit ──▶ Cached answers
//! └────────┬────────┘
//!          │ Miss
//!          ▼
//! ┌─────────────────┐
//! │   Blacklist     │ ─── Blocked ──▶ NXDOMAIN
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Upstream     │ ─── Query ──▶ Upstream Server
//! └────────┬────────┘
//!          │
//!          ▼
//!   Response (+ Cache Store)
//! ```
//!
//! # Modules
//!
//! - [`filter`]: bloom-filtered blacklist and the static override map
//! - [`cache`]: TTL-bounded response cache
//! - [`client`]: upstream resolver contract and UDP client
//! - [`server`]: query pipeline, reply writers and the UDP listener
//! - [`metrics`]: latency observations and the histogram registry
//! - [`error`]: runtime and load error types

pub mod cache;
pub mod client;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod server;

pub use cache::{spawn_housekeeping, CacheEntry, CacheKey, CacheStats, ResponseCache};
pub use client::{DnsUpstream, UdpClient, UpstreamReply};
pub use error::{DnsError, DnsResult, LoadError};
pub use filter::{Blacklist, BloomFilter, OverrideMap};
pub use metrics::{HistogramRegistry, MetricsSink, NoopMetrics, Observation};
pub use server::{QueryOutcome, QueryPipeline, ResponseWriter, UdpDnsServer};
