//! Reply channel back to the querying client
//!
//! The pipeline does not know about sockets. It hands finished messages to a
//! [`ResponseWriter`] bound to the client that sent the query.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::dns::error::{DnsError, DnsResult};

/// Sink for the reply to one query
#[async_trait]
pub trait ResponseWriter: Send {
    /// Serialize and send `message` to the client
    ///
    /// # Errors
    ///
    /// Returns `DnsError::SerializeError` if the message cannot be encoded
    /// and `DnsError::WriteError` if sending fails.
    async fn write_message(&mut self, message: &Message) -> DnsResult<()>;

    /// Address of the client this writer answers
    fn peer(&self) -> SocketAddr;
}

/// Writes replies through the server's shared UDP socket
#[derive(Debug, Clone)]
pub struct UdpResponseWriter {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpResponseWriter {
    /// Create a writer answering `peer` through `socket`
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

#[async_trait]
impl ResponseWriter for UdpResponseWriter {
    async fn write_message(&mut self, message: &Message) -> DnsResult<()> {
        let bytes = message
            .to_vec()
            .map_err(|e| DnsError::serialize(format!("failed to serialize DNS response: {e}")))?;
        let sent = self
            .socket
            .send_to(&bytes, self.peer)
            .await
            .map_err(|e| DnsError::write_io(self.peer, e))?;
        if sent != bytes.len() {
            return Err(DnsError::write(
                self.peer,
                format!("short write: {sent} of {} bytes", bytes.len()),
            ));
        }
        trace!(dst = %self.peer, len = sent, "Sent UDP DNS response");
        Ok(())
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// Keeps replies in memory instead of sending them
///
/// Lets the pipeline run without a socket, e.g. when embedding it behind
/// another transport or in tests.
#[derive(Debug, Clone)]
pub struct CollectingWriter {
    peer: SocketAddr,
    messages: Vec<Message>,
    fail: bool,
}

impl CollectingWriter {
    /// Create an empty writer for `peer`
    #[must_use]
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            messages: Vec::new(),
            fail: false,
        }
    }

    /// Create a writer whose every write fails
    #[must_use]
    pub fn failing(peer: SocketAddr) -> Self {
        Self {
            fail: true,
            ..Self::new(peer)
        }
    }

    /// Replies written so far
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Take the replies written so far
    pub fn take(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }
}

#[async_trait]
impl ResponseWriter for CollectingWriter {
    async fn write_message(&mut self, message: &Message) -> DnsResult<()> {
        if self.fail {
            return Err(DnsError::write(self.peer, "writer closed"));
        }
        self.messages.push(message.clone());
        Ok(())
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }
}
