//! Upstream resolver contract
//!
//! The pipeline only needs one operation from an upstream: forward a query,
//! get back the reply and the round-trip time, or an error. Any transport
//! failure, timeout or mismatched reply is an error and the pipeline drops
//! the query.
//!
//! # Example
//!
//! ```no_run
//! use dns_sinkhole::dns::client::DnsUpstream;
//! use hickory_proto::op::Message;
//!
//! async fn forward(upstream: &dyn DnsUpstream, query: &Message) {
//!     match upstream.exchange(query).await {
//!         Ok(reply) => println!("{} answers in {:?}", reply.message.answer_count(), reply.rtt),
//!         Err(e) => println!("Upstream {} failed: {}", upstream.address(), e),
//!     }
//! }
//! ```

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;

use crate::dns::error::DnsResult;

/// Default time to wait for an upstream reply
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of additional attempts after a failed UDP exchange
pub const DEFAULT_UDP_RETRIES: u32 = 0;

/// Receive buffer for UDP replies, large enough for EDNS0 payloads
pub const UDP_RECV_BUFFER_SIZE: usize = 4096;

/// A reply from the upstream resolver
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    /// The response message, unmodified
    pub message: Message,
    /// Time between sending the query and receiving this reply
    pub rtt: Duration,
}

/// An upstream recursive resolver
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// concurrently handled query.
#[async_trait]
pub trait DnsUpstream: Send + Sync + Debug {
    /// Forward `query` and wait for the matching reply
    ///
    /// # Errors
    ///
    /// Returns `DnsError` if:
    /// - the network exchange fails
    /// - no reply arrives within [`DnsUpstream::timeout`]
    /// - the reply cannot be parsed or does not match the query
    async fn exchange(&self, query: &Message) -> DnsResult<UpstreamReply>;

    /// Address of the upstream server, for logging
    fn address(&self) -> &str;

    /// Short name used in logs; defaults to the address
    fn tag(&self) -> &str {
        self.address()
    }

    /// How long one exchange may wait for a reply
    fn timeout(&self) -> Duration {
        DEFAULT_QUERY_TIMEOUT
    }
}

/// Check that `response` answers `query`
///
/// The ID and the first question (name, type, class) must match. A reply
/// that fails this check must never reach the client.
#[must_use]
pub fn validate_response(query: &Message, response: &Message) -> bool {
    if query.id() != response.id() {
        return false;
    }

    match (query.queries().first(), response.queries().first()) {
        (Some(q), Some(r)) => {
            q.name() == r.name()
                && q.query_type() == r.query_type()
                && q.query_class() == r.query_class()
        }
        (None, None) => true,
        _ => false,
    }
}
