//! Two-tier domain blacklist
//!
//! Membership is answered in two steps:
//!
//! 1. A [`BloomFilter`] rejects most allowed domains without touching the
//!    domain list. It never reports a blocked domain as absent.
//! 2. When the filter says "maybe", a binary search over the sorted domain
//!    list settles the answer exactly.
//!
//! The list is loaded once from a text file holding one lowercase domain per
//! line, sorted ascending. Sortedness is a property of the file; the loader
//! does not sort or deduplicate, and an unsorted file makes exact matches
//! miss silently. [`Blacklist::is_sorted`] exists to check a file in tests
//! and tooling.
//!
//! # Example
//!
//! ```
//! use dns_sinkhole::dns::filter::Blacklist;
//!
//! let blacklist = Blacklist::from_sorted(vec![
//!     "ads.example.com".to_string(),
//!     "tracker.example.net".to_string(),
//! ]);
//!
//! assert_eq!(blacklist.size(), 2);
//! assert!(blacklist.contains("ADS.example.com"));
//! assert!(!blacklist.contains("example.com"));
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::bloom::BloomFilter;
use crate::dns::error::LoadError;
use crate::dns::metrics::{MetricsSink, NoopMetrics, Observation};

/// Filter bits allocated per loaded domain
pub const BITS_PER_DOMAIN: usize = 10;

/// Probes per key in the bloom filter
pub const BLOOM_HASHES: u32 = 5;

/// Read buffer for the newline counting pass
const COUNT_BUFFER_SIZE: usize = 64 * 1024;

/// Immutable set of blocked domains
///
/// Safe to share between tasks behind an `Arc`; lookups take no locks.
pub struct Blacklist {
    filter: BloomFilter,
    domains: Vec<String>,
    metrics: Arc<dyn MetricsSink>,
}

impl Blacklist {
    /// Load a blacklist file
    ///
    /// The file is read twice. The first pass counts `\n` bytes to size the
    /// bloom filter (`count * 10` bits, 5 probes). The second pass reads
    /// exactly `count` lines, trims surrounding whitespace and inserts each
    /// one into the filter and the list in file order. A final line that is
    /// not newline-terminated is therefore ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Open`] if the file cannot be opened and
    /// [`LoadError::Read`] if reading or rewinding it fails (including
    /// non-UTF-8 content).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let start = Instant::now();

        let mut file = File::open(path).map_err(|e| LoadError::open(path, e))?;
        let count = count_newlines(&mut file).map_err(|e| LoadError::read(path, e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| LoadError::read(path, e))?;

        let mut filter = BloomFilter::new(count * BITS_PER_DOMAIN, BLOOM_HASHES);
        let mut domains = Vec::with_capacity(count);

        let mut reader = BufReader::new(file);
        let mut line = String::new();
        for _ in 0..count {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| LoadError::read(path, e))?;
            if read == 0 {
                break;
            }
            let domain = line.trim();
            filter.insert(domain.as_bytes());
            domains.push(domain.to_string());
        }

        info!(
            path = %path.display(),
            domains = domains.len(),
            filter_bytes = filter.size_bytes(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded blacklist"
        );

        Ok(Self {
            filter,
            domains,
            metrics: Arc::new(NoopMetrics),
        })
    }

    /// Build a blacklist from domains already sorted ascending
    ///
    /// Domains are inserted as given, with the same sizing as [`Blacklist::load`].
    #[must_use]
    pub fn from_sorted(domains: Vec<String>) -> Self {
        let mut filter = BloomFilter::new(domains.len() * BITS_PER_DOMAIN, BLOOM_HASHES);
        for domain in &domains {
            filter.insert(domain.as_bytes());
        }
        Self {
            filter,
            domains,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report lookup latency to `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Number of domains loaded
    #[must_use]
    pub fn size(&self) -> usize {
        self.domains.len()
    }

    /// Whether no domains were loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Check whether `domain` is blocked
    ///
    /// The domain is lowercased before the lookup. A trailing root dot is
    /// not stripped here; callers pass the bare name.
    #[must_use]
    pub fn contains(&self, domain: &str) -> bool {
        let start = Instant::now();
        let domain = domain.to_ascii_lowercase();

        if !self.filter.contains(domain.as_bytes()) {
            self.metrics.record(
                Observation::BlacklistLookup {
                    bloom_filter: "absent",
                    array: "absent",
                },
                start.elapsed(),
            );
            return false;
        }

        let found = self
            .domains
            .binary_search_by(|probe| probe.as_str().cmp(domain.as_str()))
            .is_ok();

        if !found {
            debug!(domain = %domain, "Bloom filter false positive");
        }

        self.metrics.record(
            Observation::BlacklistLookup {
                bloom_filter: "maybe",
                array: if found { "present" } else { "absent" },
            },
            start.elapsed(),
        );
        found
    }

    /// Whether the loaded list is in ascending order
    ///
    /// Equal neighbours count as sorted.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.domains.windows(2).all(|w| w[0] <= w[1])
    }

    /// Bytes held by the bloom filter
    #[must_use]
    pub fn filter_size_bytes(&self) -> usize {
        self.filter.size_bytes()
    }
}

impl fmt::Debug for Blacklist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blacklist")
            .field("size", &self.domains.len())
            .field("filter_bits", &self.filter.bit_len())
            .finish_non_exhaustive()
    }
}

fn count_newlines(reader: &mut impl Read) -> std::io::Result<usize> {
    let mut buf = vec![0u8; COUNT_BUFFER_SIZE];
    let mut count = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(count),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        count += buf[..n].iter().filter(|&&b| b == b'\n').count();
    }
}
