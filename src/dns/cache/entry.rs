//! Cached answer with its absolute deadline

use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::op::Message;

/// A stored response and the instant it stops being valid
///
/// The message is shared behind an `Arc`, so cloning an entry out of the
/// cache does not copy the records.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    message: Arc<Message>,
    ttl: Duration,
    inserted_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` from now
    #[must_use]
    pub fn new(message: Arc<Message>, ttl: Duration) -> Self {
        let inserted_at = Instant::now();
        Self {
            message,
            ttl,
            inserted_at,
            expires_at: inserted_at + ttl,
        }
    }

    /// The stored message
    #[must_use]
    pub fn message(&self) -> &Arc<Message> {
        &self.message
    }

    /// Lifetime requested at insertion
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Absolute expiration instant
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Whether the deadline has passed at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry, zero once expired
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Time since insertion
    #[must_use]
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_fresh() {
        let entry = CacheEntry::new(Arc::new(Message::new()), Duration::from_secs(300));
        assert!(!entry.is_expired());
        assert_eq!(entry.ttl(), Duration::from_secs(300));
        assert!(entry.remaining() <= Duration::from_secs(300));
        assert!(entry.remaining() > Duration::from_secs(299));
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let entry = CacheEntry::new(Arc::new(Message::new()), Duration::ZERO);
        assert!(entry.is_expired());
        assert_eq!(entry.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_expired_at_deadline() {
        let entry = CacheEntry::new(Arc::new(Message::new()), Duration::from_secs(10));
        assert!(!entry.is_expired_at(entry.expires_at() - Duration::from_millis(1)));
        assert!(entry.is_expired_at(entry.expires_at()));
        assert!(entry.is_expired_at(entry.expires_at() + Duration::from_secs(1)));
    }

    #[test]
    fn test_clone_shares_message() {
        let entry = CacheEntry::new(Arc::new(Message::new()), Duration::from_secs(1));
        let cloned = entry.clone();
        assert!(Arc::ptr_eq(entry.message(), cloned.message()));
    }
}
