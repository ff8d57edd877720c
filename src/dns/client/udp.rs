//! UDP upstream client
//!
//! Plain DNS over UDP (RFC 1035). Every exchange uses a fresh ephemeral
//! socket, so concurrent queries never share a socket and a late reply to
//! one exchange cannot be read by another.
//!
//! # Features
//!
//! - Bounded wait per attempt (default 2 s)
//! - Optional retries of recoverable failures (default none; the pipeline does not retry)
//! - Source address, query ID and question validation
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use dns_sinkhole::dns::client::{DnsUpstream, UdpClient};
//! use hickory_proto::op::Message;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = UdpClient::new("1.1.1.1:53")?.with_timeout(Duration::from_secs(1));
//!
//! let mut query = Message::new();
//! query.set_id(0x1234);
//! // ... set up query ...
//!
//! let reply = client.exchange(&query).await?;
//! println!("rtt = {:?}", reply.rtt);
//! # Ok(())
//! # }
//! ```

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use super::traits::{
    validate_response, DnsUpstream, UpstreamReply, DEFAULT_QUERY_TIMEOUT, DEFAULT_UDP_RETRIES,
    UDP_RECV_BUFFER_SIZE,
};
use crate::dns::error::{DnsError, DnsResult};

/// UDP DNS client
///
/// Stateless and cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct UdpClient {
    /// Address as configured, used in logs and errors
    address: String,

    /// Parsed server address
    server_addr: SocketAddr,

    /// Wait per attempt
    timeout: Duration,

    /// Additional attempts after a failure
    retries: u32,
}

impl UdpClient {
    /// Create a client for `address` (`ip:port`)
    ///
    /// # Errors
    ///
    /// Returns `DnsError::ConfigError` if the address cannot be parsed.
    ///
    /// # Example
    ///
    /// ```
    /// use dns_sinkhole::dns::client::UdpClient;
    ///
    /// let client = UdpClient::new("1.1.1.1:53").unwrap();
    /// assert_eq!(client.server_addr().port(), 53);
    /// assert!(UdpClient::new("1.1.1.1").is_err());
    /// ```
    pub fn new(address: impl Into<String>) -> DnsResult<Self> {
        let address = address.into();
        let server_addr: SocketAddr = address.parse().map_err(|e| {
            DnsError::config_field(
                format!("invalid UDP server address '{address}': {e}"),
                "upstream",
            )
        })?;

        Ok(Self {
            address,
            server_addr,
            timeout: DEFAULT_QUERY_TIMEOUT,
            retries: DEFAULT_UDP_RETRIES,
        })
    }

    /// Set the wait per attempt
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of additional attempts after a failure
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Parsed server address
    #[must_use]
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Configured retry count
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Perform a single exchange without retries
    async fn exchange_once(&self, query: &Message, query_bytes: &[u8]) -> DnsResult<UpstreamReply> {
        let bind_addr: SocketAddr = if self.server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DnsError::network_io("failed to bind UDP socket", e))?;

        let start = Instant::now();
        socket
            .send_to(query_bytes, self.server_addr)
            .await
            .map_err(|e| {
                DnsError::network_io(format!("failed to send UDP query to {}", self.server_addr), e)
            })?;

        let mut recv_buf = vec![0u8; UDP_RECV_BUFFER_SIZE];
        let (len, src) = match timeout(self.timeout, socket.recv_from(&mut recv_buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                return Err(DnsError::network_io(
                    format!("failed to receive UDP response from {}", self.server_addr),
                    e,
                ))
            }
            Err(_) => {
                return Err(DnsError::timeout(
                    format!("UDP query to {}", self.server_addr),
                    self.timeout,
                ))
            }
        };
        let rtt = start.elapsed();

        if src != self.server_addr {
            return Err(DnsError::upstream(
                &self.address,
                format!("response from unexpected source: {src} (expected {})", self.server_addr),
            ));
        }

        let message = Message::from_vec(&recv_buf[..len])
            .map_err(|e| DnsError::parse(format!("failed to parse DNS response: {e}")))?;

        if !validate_response(query, &message) {
            return Err(DnsError::upstream(
                &self.address,
                "response validation failed (ID or question mismatch)",
            ));
        }

        Ok(UpstreamReply { message, rtt })
    }
}

#[async_trait]
impl DnsUpstream for UdpClient {
    async fn exchange(&self, query: &Message) -> DnsResult<UpstreamReply> {
        let query_bytes = query
            .to_vec()
            .map_err(|e| DnsError::serialize(format!("failed to serialize DNS query: {e}")))?;

        let mut last_error = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                debug!(
                    upstream = %self.address,
                    attempt = attempt + 1,
                    max_attempts = self.retries + 1,
                    "retrying UDP query"
                );
            }

            match self.exchange_once(query, &query_bytes).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_recoverable() => {
                    debug!(
                        upstream = %self.address,
                        attempt = attempt + 1,
                        error = %e,
                        "UDP query attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| DnsError::upstream(&self.address, "all UDP query attempts failed")))
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
