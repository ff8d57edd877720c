//! Response cache
//!
//! Answers from upstream are stored per question identity ([`CacheKey`])
//! with an absolute deadline taken from the TTL of the first answer record.
//!
//! - **Per-entry TTL**: moka's `Expiry` hook expires each entry at its own deadline
//! - **Never stale**: `get` re-checks the deadline, so an entry moka has not yet
//!   swept is still never returned after it expires
//! - **Replace, not merge**: `set` on an existing key replaces message and deadline
//! - **Thread safety**: moka's concurrent cache, no caller-side locking
//!
//! # Architecture
//!
//! ```text
//! Query → ResponseCache::get()
//!           │
//!           ├── Hit → answer from cached records
//!           │
//!           └── Miss → ... → upstream → ResponseCache::set(ttl of first answer)
//! ```
//!
//! Lookups never remove entries. Expired entries are evicted by moka and by
//! a background sweep ([`spawn_housekeeping`]) every [`DEFAULT_SWEEP_INTERVAL`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dns_sinkhole::dns::cache::ResponseCache;
//! use hickory_proto::op::{Message, Query};
//! use hickory_proto::rr::{Name, RecordType};
//! use std::str::FromStr;
//!
//! let cache = ResponseCache::new();
//! let question = Query::query(Name::from_str("example.com.").unwrap(), RecordType::A);
//!
//! cache.set(&question, Message::new(), Duration::from_secs(300));
//! assert!(cache.get(&question).is_some());
//! ```

pub mod entry;
pub mod key;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, Query};
use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::dns::metrics::{MetricsSink, NoopMetrics, Observation};
pub use entry::CacheEntry;
pub use key::CacheKey;

/// Default interval between background sweeps of expired entries
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Cache counters
///
/// All counters are atomic for thread-safe access without locking.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    expirations: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookups that returned an entry
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing usable
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries stored
    #[must_use]
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Entries removed because their deadline passed
    #[must_use]
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Hit rate as a percentage, 0.0 before any lookup
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

/// Expires each entry at its own deadline
struct EntryExpiry;

impl Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _current_time: Instant,
    ) -> Option<Duration> {
        Some(value.ttl())
    }

    fn expire_after_read(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _current_time: Instant,
        _current_duration: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        // reads never extend the deadline
        Some(value.remaining())
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl())
    }
}

/// TTL-bounded store of upstream answers
pub struct ResponseCache {
    cache: Cache<CacheKey, CacheEntry>,
    stats: Arc<CacheStats>,
    metrics: Arc<dyn MetricsSink>,
    sweep_interval: Duration,
}

impl ResponseCache {
    /// Create an empty, unbounded cache with the default sweep interval
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a cache holding at most `max_entries` answers
    ///
    /// Least recently used entries are evicted beyond that bound.
    #[must_use]
    pub fn with_max_entries(max_entries: u64) -> Self {
        Self::build(Some(max_entries))
    }

    fn build(max_entries: Option<u64>) -> Self {
        let stats = Arc::new(CacheStats::default());
        let stats_for_listener = Arc::clone(&stats);

        let mut builder = Cache::builder()
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key, _value, cause| {
                if matches!(cause, RemovalCause::Expired) {
                    stats_for_listener.record_expiration();
                }
            });
        if let Some(max_entries) = max_entries {
            builder = builder.max_capacity(max_entries);
        }

        Self {
            cache: builder.build(),
            stats,
            metrics: Arc::new(NoopMetrics),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Report operation latency to `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Change the background sweep interval
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Look up the stored answer for `question`
    ///
    /// Returns `None` if nothing is stored or the entry has expired.
    #[must_use]
    pub fn get(&self, question: &Query) -> Option<Arc<Message>> {
        let start = Instant::now();
        let key = CacheKey::from_query(question);

        let result = match self.cache.get(&key) {
            Some(entry) if !entry.is_expired() => {
                self.stats.record_hit();
                Some(Arc::clone(entry.message()))
            }
            // expired entries are left for moka to evict
            _ => {
                self.stats.record_miss();
                None
            }
        };

        self.metrics.record(
            Observation::CacheOperation { operation: "get" },
            start.elapsed(),
        );
        result
    }

    /// Store `message` for `question`, valid for `ttl`
    ///
    /// Replaces any previous entry for the same key. A zero `ttl` stores
    /// nothing and invalidates the previous entry.
    pub fn set(&self, question: &Query, message: Message, ttl: Duration) {
        let start = Instant::now();
        let key = CacheKey::from_query(question);

        if ttl.is_zero() {
            trace!(key = %key, "Not caching answer with zero TTL");
            self.cache.invalidate(&key);
        } else {
            trace!(key = %key, ttl_secs = ttl.as_secs(), "Caching answer");
            self.cache
                .insert(key, CacheEntry::new(Arc::new(message), ttl));
            self.stats.record_insert();
        }

        self.metrics.record(
            Observation::CacheOperation { operation: "set" },
            start.elapsed(),
        );
    }

    /// Approximate number of stored entries, including ones not yet swept
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache counters
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Interval used by [`spawn_housekeeping`]
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Remove expired entries now
    pub fn run_maintenance(&self) {
        self.cache.run_pending_tasks();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.cache.entry_count())
            .field("hits", &self.stats.hits())
            .field("misses", &self.stats.misses())
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

/// Sweep expired entries every [`ResponseCache::sweep_interval`]
///
/// The task holds only a weak reference and ends once the cache is dropped.
pub fn spawn_housekeeping(cache: &Arc<ResponseCache>) -> JoinHandle<()> {
    let weak: Weak<ResponseCache> = Arc::downgrade(cache);
    let period = cache.sweep_interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(cache) = weak.upgrade() else {
                debug!("Response cache dropped, stopping housekeeping");
                break;
            };
            cache.run_maintenance();
            trace!(entries = cache.len(), "Cache sweep finished");
        }
    })
}
