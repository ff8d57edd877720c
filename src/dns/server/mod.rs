//! DNS server side: listener, query pipeline and reply writers
//!
//! # Architecture
//!
//! ```text
//! Client Query (UDP)
//!     |
//!     v
//! +-------------------+
//! |  UdpDnsServer     | -- unparsable --> dropped
//! +-------------------+
//!     |
//!     v
//! +-------------------+
//! |  QueryPipeline    | -- validate / cache / blacklist / upstream
//! +-------------------+
//!     |
//!     v
//! +-------------------+
//! |  ResponseWriter   | --> client
//! +-------------------+
//! ```
//!
//! # Components
//!
//! - [`udp`]: UDP listener, one task per datagram
//! - [`handler`]: the [`QueryPipeline`] state machine
//! - [`writer`]: reply sinks ([`UdpResponseWriter`], [`CollectingWriter`])

pub mod handler;
pub mod udp;
pub mod writer;

// Re-exports
pub use handler::{PipelineStats, QueryOutcome, QueryPipeline, OVERRIDE_TTL};
pub use udp::{UdpDnsServer, UdpServerStats, MAX_UDP_MESSAGE_SIZE};
pub use writer::{CollectingWriter, ResponseWriter, UdpResponseWriter};
