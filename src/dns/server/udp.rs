//! UDP DNS listener
//!
//! ```text
//! UDP Socket (port 53)
//!     |
//!     v
//! recv_from() ── unparsable ──> dropped
//!     |
//!     v
//! tokio::spawn ── QueryPipeline::handle ── UdpResponseWriter ──> send_to()
//! ```
//!
//! Each datagram is handled on its own task, so a slow upstream exchange
//! never delays other clients.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dns_sinkhole::dns::cache::ResponseCache;
//! use dns_sinkhole::dns::client::UdpClient;
//! use dns_sinkhole::dns::filter::Blacklist;
//! use dns_sinkhole::dns::server::{QueryPipeline, UdpDnsServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Arc::new(QueryPipeline::new(
//!     Arc::new(ResponseCache::new()),
//!     Arc::new(Blacklist::load("data/blacklist.txt")?),
//!     Arc::new(UdpClient::new("1.1.1.1:53")?),
//! ));
//!
//! let server = UdpDnsServer::bind("127.0.0.1:5353".parse()?, pipeline).await?;
//! let (_tx, rx) = tokio::sync::oneshot::channel();
//! server.run_until_shutdown(rx).await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use super::handler::QueryPipeline;
use super::writer::UdpResponseWriter;
use crate::dns::error::{DnsError, DnsResult};

/// Maximum DNS message size accepted over UDP (with EDNS0)
pub const MAX_UDP_MESSAGE_SIZE: usize = 4096;

/// Consecutive receive errors after which the socket is reported degraded
const CONSECUTIVE_ERROR_THRESHOLD: u32 = 10;

/// Statistics for the UDP listener
#[derive(Debug, Default)]
pub struct UdpServerStats {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    parse_errors: AtomicU64,
    consecutive_recv_errors: AtomicU32,
}

impl UdpServerStats {
    /// Datagrams received
    #[must_use]
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    /// Bytes received
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Datagrams dropped because they were not DNS messages
    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Receive errors since the last successful receive
    #[must_use]
    pub fn consecutive_recv_errors(&self) -> u32 {
        self.consecutive_recv_errors.load(Ordering::Relaxed)
    }

    /// Whether receive errors have piled up past the threshold
    #[must_use]
    pub fn is_socket_degraded(&self) -> bool {
        self.consecutive_recv_errors() >= CONSECUTIVE_ERROR_THRESHOLD
    }
}

/// UDP DNS server feeding a [`QueryPipeline`]
pub struct UdpDnsServer {
    socket: Arc<UdpSocket>,
    pipeline: Arc<QueryPipeline>,
    stats: Arc<UdpServerStats>,
    local_addr: SocketAddr,
}

impl UdpDnsServer {
    /// Bind a new server to `addr`
    ///
    /// # Errors
    ///
    /// Returns `DnsError::NetworkError` if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr, pipeline: Arc<QueryPipeline>) -> DnsResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| DnsError::network_io(format!("failed to bind UDP socket to {addr}"), e))?;

        let server = Self::from_socket(socket, pipeline)?;
        info!(addr = %server.local_addr, "UDP DNS server bound");
        Ok(server)
    }

    /// Create a server from an already bound socket
    ///
    /// # Errors
    ///
    /// Returns `DnsError::NetworkError` if the local address is unavailable.
    pub fn from_socket(socket: UdpSocket, pipeline: Arc<QueryPipeline>) -> DnsResult<Self> {
        let local_addr = socket
            .local_addr()
            .map_err(|e| DnsError::network_io("failed to get local address", e))?;

        Ok(Self {
            socket: Arc::new(socket),
            pipeline,
            stats: Arc::new(UdpServerStats::default()),
            local_addr,
        })
    }

    /// Address the server is bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Listener statistics
    #[must_use]
    pub fn stats(&self) -> &Arc<UdpServerStats> {
        &self.stats
    }

    /// Serve queries until `shutdown_rx` fires or is dropped
    ///
    /// Queries already handed to the pipeline finish on their own tasks.
    ///
    /// # Errors
    ///
    /// Returns the socket error if receiving fails in a way that cannot be
    /// recovered from.
    pub async fn run_until_shutdown(&self, mut shutdown_rx: oneshot::Receiver<()>) -> DnsResult<()> {
        info!(addr = %self.local_addr, "UDP DNS server starting");

        let mut recv_buf = vec![0u8; MAX_UDP_MESSAGE_SIZE];
        loop {
            if self.stats.is_socket_degraded() {
                warn!(
                    recv_errors = self.stats.consecutive_recv_errors(),
                    threshold = CONSECUTIVE_ERROR_THRESHOLD,
                    "Socket appears degraded - too many consecutive errors"
                );
            }

            tokio::select! {
                result = self.socket.recv_from(&mut recv_buf) => {
                    match result {
                        Ok((len, src)) => {
                            self.stats.consecutive_recv_errors.store(0, Ordering::Relaxed);
                            self.dispatch(&recv_buf[..len], src);
                        }
                        Err(e) => {
                            self.stats.consecutive_recv_errors.fetch_add(1, Ordering::Relaxed);
                            let e = DnsError::network_io("UDP recv_from failed", e);
                            if is_fatal_error(&e) {
                                error!(error = %e, "Fatal UDP error, shutting down");
                                return Err(e);
                            }
                            debug!(error = %e, "Non-fatal UDP error");
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("UDP DNS server received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Parse one datagram and hand it to the pipeline on a new task
    fn dispatch(&self, datagram: &[u8], src: SocketAddr) {
        self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_received
            .fetch_add(datagram.len() as u64, Ordering::Relaxed);
        trace!(src = %src, len = datagram.len(), "Received UDP DNS packet");

        let query = match Message::from_vec(datagram) {
            Ok(query) => query,
            Err(e) => {
                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                debug!(src = %src, error = %e, "Dropping unparsable DNS packet");
                return;
            }
        };

        let pipeline = Arc::clone(&self.pipeline);
        let mut writer = UdpResponseWriter::new(Arc::clone(&self.socket), src);
        tokio::spawn(async move {
            pipeline.handle(&mut writer, &query).await;
        });
    }
}

impl std::fmt::Debug for UdpDnsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpDnsServer")
            .field("local_addr", &self.local_addr)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Whether a socket error should stop the server
///
/// Fatal errors include:
/// - Permission denied or address in use
/// - Out of memory (ENOMEM) and no buffer space (ENOBUFS)
/// - Too many open files (EMFILE, ENFILE)
/// - Network down (ENETDOWN) or host unreachable (EHOSTUNREACH)
fn is_fatal_error(err: &DnsError) -> bool {
    let DnsError::NetworkError {
        source: Some(io_err),
        ..
    } = err
    else {
        return false;
    };

    match io_err.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::AddrInUse | io::ErrorKind::OutOfMemory => {
            true
        }
        io::ErrorKind::Other => io_err
            .raw_os_error()
            .is_some_and(|raw| matches!(raw, 12 | 23 | 24 | 100 | 105 | 113)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::cache::ResponseCache;
    use crate::dns::client::UdpClient;
    use crate::dns::filter::Blacklist;
    use hickory_proto::op::{Query, ResponseCode};
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;
    use std::time::Duration;

    fn create_pipeline() -> Arc<QueryPipeline> {
        // upstream is a closed port; only blacklisted names are answered
        let upstream = UdpClient::new("127.0.0.1:9")
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        Arc::new(QueryPipeline::new(
            Arc::new(ResponseCache::new()),
            Arc::new(Blacklist::from_sorted(vec!["blocked.test".to_string()])),
            Arc::new(upstream),
        ))
    }

    async fn create_test_server() -> (Arc<UdpDnsServer>, oneshot::Sender<()>) {
        let server = Arc::new(
            UdpDnsServer::bind("127.0.0.1:0".parse().unwrap(), create_pipeline())
                .await
                .unwrap(),
        );
        let (tx, rx) = oneshot::channel();
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.run_until_shutdown(rx).await });
        (server, tx)
    }

    fn create_query(domain: &str, id: u16) -> Vec<u8> {
        let mut message = Message::new();
        message.set_id(id);
        message.set_recursion_desired(true);
        message.add_query(Query::query(Name::from_str(domain).unwrap(), RecordType::A));
        message.to_vec().unwrap()
    }

    // ========================================================================
    // Creation Tests
    // ========================================================================

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = UdpDnsServer::bind("127.0.0.1:0".parse().unwrap(), create_pipeline())
            .await
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.stats().packets_received(), 0);
    }

    #[tokio::test]
    async fn test_from_socket() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local_addr = socket.local_addr().unwrap();
        let server = UdpDnsServer::from_socket(socket, create_pipeline()).unwrap();
        assert_eq!(server.local_addr(), local_addr);
    }

    #[tokio::test]
    async fn test_bind_in_use_fails() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let err = UdpDnsServer::bind(taken.local_addr().unwrap(), create_pipeline())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to bind UDP socket"));
    }

    // ========================================================================
    // Serving Tests
    // ========================================================================

    #[tokio::test]
    async fn test_blocked_query_over_udp() {
        let (server, _tx) = create_test_server().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client
            .send_to(&create_query("blocked.test.", 0xABCD), server.local_addr())
            .await
            .unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = Message::from_vec(&buf[..len]).unwrap();
        assert_eq!(reply.id(), 0xABCD);
        assert_eq!(reply.response_code(), ResponseCode::NXDomain);
        assert_eq!(server.stats().packets_received(), 1);
    }

    #[tokio::test]
    async fn test_garbage_datagram_dropped() {
        let (server, _tx) = create_test_server().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&[0xFF, 0x00, 0x01], server.local_addr()).await.unwrap();

        let mut buf = [0u8; 512];
        let received =
            tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(received.is_err(), "no reply expected for garbage");
        assert_eq!(server.stats().parse_errors(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_sends_nothing() {
        let (server, _tx) = create_test_server().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client
            .send_to(&create_query("allowed.test.", 7), server.local_addr())
            .await
            .unwrap();

        let mut buf = [0u8; 512];
        let received =
            tokio::time::timeout(Duration::from_millis(400), client.recv_from(&mut buf)).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn test_run_until_shutdown_returns() {
        let server = UdpDnsServer::bind("127.0.0.1:0".parse().unwrap(), create_pipeline())
            .await
            .unwrap();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move { server.run_until_shutdown(rx).await });

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    // ========================================================================
    // Error Classification Tests
    // ========================================================================

    #[test]
    fn test_is_fatal_error_permission_denied() {
        let err = DnsError::network_io(
            "bind",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(is_fatal_error(&err));
    }

    #[test]
    fn test_is_fatal_error_addr_in_use() {
        let err = DnsError::network_io("bind", io::Error::new(io::ErrorKind::AddrInUse, "in use"));
        assert!(is_fatal_error(&err));
    }

    #[test]
    fn test_is_fatal_error_connection_reset() {
        let err = DnsError::network_io(
            "recv",
            io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
        );
        assert!(!is_fatal_error(&err));
    }

    #[test]
    fn test_is_fatal_error_without_source() {
        assert!(!is_fatal_error(&DnsError::network("no source")));
        assert!(!is_fatal_error(&DnsError::parse("bad packet")));
    }

    #[test]
    fn test_socket_degraded_threshold() {
        let stats = UdpServerStats::default();
        assert!(!stats.is_socket_degraded());
        stats
            .consecutive_recv_errors
            .store(CONSECUTIVE_ERROR_THRESHOLD, Ordering::Relaxed);
        assert!(stats.is_socket_degraded());
    }
}
