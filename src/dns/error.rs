//! Error types for the DNS resolution pipeline
//!
//! Two families live here:
//!
//! - [`DnsError`]: runtime failures while answering a query (message parsing,
//!   upstream exchange, writing the reply back to the client).
//! - [`LoadError`]: startup failures while reading the blacklist or the
//!   override file. These are fatal for the process, but the library only
//!   returns them; the binary decides to abort.
//!
//! # Example
//!
//! ```
//! use dns_sinkhole::dns::DnsError;
//!
//! let err = DnsError::timeout("query to 1.1.1.1:53", std::time::Duration::from_secs(2));
//! assert!(err.is_recoverable());
//! assert!(err.to_string().contains("timed out"));
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Error types for query handling
///
/// # Recoverability
///
/// - **Recoverable**: transient issues (timeouts, network errors, upstream failures)
/// - **Non-recoverable**: malformed messages, invalid queries, bad configuration
#[derive(Debug, Error)]
pub enum DnsError {
    /// DNS message parsing failed
    #[error("Failed to parse DNS message: {reason}")]
    ParseError {
        /// Description of what went wrong during parsing
        reason: String,
    },

    /// DNS message serialization failed
    #[error("Failed to serialize DNS message: {reason}")]
    SerializeError {
        /// Description of what went wrong during serialization
        reason: String,
    },

    /// Network I/O error
    #[error("Network error: {reason}")]
    NetworkError {
        /// Description of the network failure
        reason: String,
        /// The underlying I/O error, if available
        #[source]
        source: Option<io::Error>,
    },

    /// Query timeout
    #[error("DNS query timed out after {timeout:?}: {context}")]
    TimeoutError {
        /// Description of what timed out
        context: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// Upstream server error
    ///
    /// Covers protocol errors and replies that do not match the query.
    #[error("Upstream server error ({upstream}): {reason}")]
    UpstreamError {
        /// The upstream server address
        upstream: String,
        /// Description of the upstream failure
        reason: String,
    },

    /// The query violates the single-question assumption or is otherwise unusable
    #[error("Invalid DNS query: {reason}")]
    InvalidQuery {
        /// Description of why the query is invalid
        reason: String,
        /// The query ID, if available
        query_id: Option<u16>,
    },

    /// Writing the reply back to the client failed
    #[error("Failed to write DNS response to {client}: {reason}")]
    WriteError {
        /// The client the reply was meant for
        client: SocketAddr,
        /// Description of the failure
        reason: String,
        /// The underlying I/O error, if available
        #[source]
        source: Option<io::Error>,
    },

    /// Invalid configuration
    #[error("Invalid DNS configuration: {reason}")]
    ConfigError {
        /// Description of the configuration error
        reason: String,
        /// The configuration field that is invalid, if applicable
        field: Option<String>,
    },
}

impl DnsError {
    // ========================================================================
    // Constructor methods
    // ========================================================================

    /// Create a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ParseError {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialize(reason: impl Into<String>) -> Self {
        Self::SerializeError {
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkError {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a network error from an I/O error
    ///
    /// # Example
    ///
    /// ```
    /// use dns_sinkhole::dns::DnsError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
    /// let err = DnsError::network_io("send failed", io_err);
    /// assert!(err.to_string().contains("send failed"));
    /// ```
    pub fn network_io(reason: impl Into<String>, source: io::Error) -> Self {
        Self::NetworkError {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Create a timeout error
    pub fn timeout(context: impl Into<String>, timeout: Duration) -> Self {
        Self::TimeoutError {
            context: context.into(),
            timeout,
        }
    }

    /// Create an upstream error
    ///
    /// # Example
    ///
    /// ```
    /// use dns_sinkhole::dns::DnsError;
    ///
    /// let err = DnsError::upstream("1.1.1.1:53", "connection reset");
    /// assert!(err.to_string().contains("1.1.1.1:53"));
    /// assert!(err.is_recoverable());
    /// ```
    pub fn upstream(upstream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamError {
            upstream: upstream.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid query error with query ID
    pub fn invalid_query_id(reason: impl Into<String>, query_id: u16) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
            query_id: Some(query_id),
        }
    }

    /// Create a write error from an I/O error
    pub fn write_io(client: SocketAddr, source: io::Error) -> Self {
        Self::WriteError {
            client,
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a write error without an underlying I/O error
    pub fn write(client: SocketAddr, reason: impl Into<String>) -> Self {
        Self::WriteError {
            client,
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a configuration error with field context
    pub fn config_field(reason: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
            field: Some(field.into()),
        }
    }

    // ========================================================================
    // Classification methods
    // ========================================================================

    /// Check if this error is recoverable
    ///
    /// Recoverable errors are transient and a later query may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NetworkError { source, .. } | Self::WriteError { source, .. } => {
                source.as_ref().is_none_or(|e| {
                    matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    )
                })
            }
            Self::TimeoutError { .. } | Self::UpstreamError { .. } => true,
            Self::ParseError { .. }
            | Self::SerializeError { .. }
            | Self::InvalidQuery { .. }
            | Self::ConfigError { .. } => false,
        }
    }

    /// Check if this error indicates a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutError { .. })
    }

    /// Get the query ID associated with this error, if any
    #[must_use]
    pub fn query_id(&self) -> Option<u16> {
        match self {
            Self::InvalidQuery { query_id, .. } => *query_id,
            _ => None,
        }
    }
}

/// Result type alias for DNS operations
pub type DnsResult<T> = Result<T, DnsError>;

/// Failure to load a domain list from disk
///
/// Returned by the blacklist and override loaders. A process cannot serve
/// correct answers with a partial blacklist, so callers usually abort on it.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be opened
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        /// Path of the file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file was opened but reading it failed
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// Path of the file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A line does not follow the expected format
    #[error("Malformed line {line} in {}: {reason}", path.display())]
    Malformed {
        /// Path of the file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What is wrong with the line
        reason: String,
    },
}

impl LoadError {
    pub(crate) fn open(path: &Path, source: io::Error) -> Self {
        Self::Open {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }

    /// Path of the file that failed to load
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Open { path, .. } | Self::Read { path, .. } | Self::Malformed { path, .. } => {
                path
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_recoverable() {
        let err = DnsError::timeout("query", Duration::from_secs(2));
        assert!(err.is_recoverable());
        assert!(err.is_timeout());
    }

    #[test]
    fn test_upstream_is_recoverable() {
        let err = DnsError::upstream("1.1.1.1:53", "ID mismatch");
        assert!(err.is_recoverable());
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("ID mismatch"));
    }

    #[test]
    fn test_invalid_query_not_recoverable() {
        let err = DnsError::invalid_query_id("expected exactly one question, got 2", 0x1234);
        assert!(!err.is_recoverable());
        assert_eq!(err.query_id(), Some(0x1234));
    }

    #[test]
    fn test_network_error_classification() {
        let refused = DnsError::network_io(
            "send",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert!(refused.is_recoverable());

        let denied = DnsError::network_io(
            "bind",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!denied.is_recoverable());

        assert!(DnsError::network("no source").is_recoverable());
    }

    #[test]
    fn test_write_error_display() {
        let client: SocketAddr = "127.0.0.1:5353".parse().unwrap();
        let err = DnsError::write_io(client, io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(err, DnsError::WriteError { .. }));
        assert!(err.to_string().contains("127.0.0.1:5353"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_error_display() {
        let err = DnsError::config_field("invalid address", "upstream");
        assert!(err.to_string().contains("invalid address"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_load_error_path() {
        let err = LoadError::open(
            Path::new("/nonexistent/blacklist.txt"),
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(err.path(), Path::new("/nonexistent/blacklist.txt"));
        assert!(err.to_string().contains("/nonexistent/blacklist.txt"));

        let err = LoadError::malformed(Path::new("override.txt"), 3, "missing address");
        assert!(err.to_string().contains("line 3"));
    }
}
