//! Upstream resolver clients
//!
//! - [`DnsUpstream`]: the contract the pipeline forwards queries through
//! - [`UdpClient`]: plain UDP implementation
//!
//! ```text
//! QueryPipeline ──exchange(query)──> DnsUpstream ──UDP──> upstream resolver
//!               <──(reply, rtt)─────             <──────
//! ```

mod traits;
mod udp;

pub use traits::{
    validate_response, DnsUpstream, UpstreamReply, DEFAULT_QUERY_TIMEOUT, DEFAULT_UDP_RETRIES,
    UDP_RECV_BUFFER_SIZE,
};
pub use udp::UdpClient;
