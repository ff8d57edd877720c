//! Latency instrumentation for the resolution pipeline
//!
//! The pipeline, the blacklist and the cache never talk to a metrics backend
//! directly. They report timed [`Observation`]s to an injected [`MetricsSink`].
//!
//! Two sinks are provided:
//!
//! - [`NoopMetrics`]: discards everything (the default for library users and tests)
//! - [`HistogramRegistry`]: in-memory histograms rendered in the Prometheus
//!   text exposition format by the `/metrics` endpoint
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dns_sinkhole::dns::metrics::{HistogramRegistry, MetricsSink, Observation};
//!
//! let registry = HistogramRegistry::new("sinkhole");
//! registry.record(Observation::query("cache", "A"), Duration::from_micros(40));
//!
//! assert_eq!(registry.sample_count(&Observation::query("cache", "A")), 1);
//! assert!(registry.render().contains("sinkhole_dns_queries_duration_seconds_count"));
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::time::Duration;

use parking_lot::Mutex;

/// Bucket boundaries (seconds) for end-to-end query handling
const QUERY_BUCKETS: &[f64] = &[
    1e-5, 2.5e-5, 5e-5, 7.5e-5, 1e-4, 2.5e-4, 5e-4, 7.5e-4, 1e-3, 2.5e-3, 5e-3, 7.5e-3, 1e-2,
    2.5e-2, 5e-2, 7.5e-2, 1e-1,
];

/// Bucket boundaries (seconds) for blacklist lookups and cache operations
const FAST_PATH_BUCKETS: &[f64] = &[
    1e-6, 1.75e-6, 2.5e-6, 3.75e-6, 5e-6, 6.25e-6, 7.5e-6, 8.75e-6, 1e-5,
];

/// Histogram families reported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    /// End-to-end query handling, labelled by status and record type
    Query,
    /// Blacklist membership test, labelled by filter and array verdicts
    BlacklistLookup,
    /// Cache get/set
    CacheOperation,
}

impl Family {
    fn name(self) -> &'static str {
        match self {
            Self::Query => "dns_queries_duration_seconds",
            Self::BlacklistLookup => "blacklist_lookup_duration_seconds",
            Self::CacheOperation => "cache_operation_duration_seconds",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Self::Query => "Duration of replies to DNS queries.",
            Self::BlacklistLookup => "Duration of a domain lookup in the blacklist.",
            Self::CacheOperation => "Duration of an operation on the cache.",
        }
    }

    fn label_names(self) -> &'static [&'static str] {
        match self {
            Self::Query => &["status", "query"],
            Self::BlacklistLookup => &["bloom_filter", "array"],
            Self::CacheOperation => &["operation"],
        }
    }

    fn buckets(self) -> &'static [f64] {
        match self {
            Self::Query => QUERY_BUCKETS,
            Self::BlacklistLookup | Self::CacheOperation => FAST_PATH_BUCKETS,
        }
    }
}

/// A single timed event and its label set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation<'a> {
    /// One query went through the pipeline
    Query {
        /// Outcome label (`cache`, `block`, `upstream`, ...)
        status: &'a str,
        /// Record type label (`A`, `AAAA`, ...) or `-`
        query: &'a str,
    },
    /// One blacklist membership test
    BlacklistLookup {
        /// Bloom filter verdict: `absent` or `maybe`
        bloom_filter: &'static str,
        /// Exact match verdict: `absent` or `present`
        array: &'static str,
    },
    /// One cache operation
    CacheOperation {
        /// `get` or `set`
        operation: &'static str,
    },
}

impl<'a> Observation<'a> {
    /// Shorthand for [`Observation::Query`]
    #[must_use]
    pub fn query(status: &'a str, query: &'a str) -> Self {
        Self::Query { status, query }
    }

    /// The histogram family this observation belongs to
    #[must_use]
    pub fn family(&self) -> Family {
        match self {
            Self::Query { .. } => Family::Query,
            Self::BlacklistLookup { .. } => Family::BlacklistLookup,
            Self::CacheOperation { .. } => Family::CacheOperation,
        }
    }

    fn label_values(&self) -> Vec<String> {
        match *self {
            Self::Query { status, query } => vec![status.to_string(), query.to_string()],
            Self::BlacklistLookup {
                bloom_filter,
                array,
            } => vec![bloom_filter.to_string(), array.to_string()],
            Self::CacheOperation { operation } => vec![operation.to_string()],
        }
    }
}

/// Destination for timing observations
///
/// Implementations must be cheap and non-blocking: `record` sits on the
/// query hot path.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    /// Record one observation that took `elapsed`
    fn record(&self, observation: Observation<'_>, elapsed: Duration);
}

/// Sink that drops every observation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _observation: Observation<'_>, _elapsed: Duration) {}
}

#[derive(Debug, Clone)]
struct Histogram {
    /// Cumulative count per bucket boundary
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(bucket_count: usize) -> Self {
        Self {
            buckets: vec![0; bucket_count],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, bounds: &[f64], value: f64) {
        for (slot, bound) in self.buckets.iter_mut().zip(bounds) {
            if value <= *bound {
                *slot += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

/// In-memory histogram registry with Prometheus text rendering
///
/// Series are created lazily on first observation. A single mutex guards
/// the registry; the critical section is a map lookup and a few additions.
#[derive(Debug)]
pub struct HistogramRegistry {
    namespace: String,
    series: Mutex<BTreeMap<(Family, Vec<String>), Histogram>>,
}

impl HistogramRegistry {
    /// Create an empty registry; every metric name is prefixed with `namespace_`
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            series: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of samples recorded for the observation's label set
    #[must_use]
    pub fn sample_count(&self, observation: &Observation<'_>) -> u64 {
        let key = (observation.family(), observation.label_values());
        self.series.lock().get(&key).map_or(0, |h| h.count)
    }

    /// Total number of samples recorded for a family, across all label sets
    #[must_use]
    pub fn family_count(&self, family: Family) -> u64 {
        self.series
            .lock()
            .iter()
            .filter(|((f, _), _)| *f == family)
            .map(|(_, h)| h.count)
            .sum()
    }

    /// Render all series in the Prometheus text exposition format
    #[must_use]
    pub fn render(&self) -> String {
        let snapshot = self.series.lock().clone();
        let mut output = String::with_capacity(4096);

        for family in [Family::Query, Family::BlacklistLookup, Family::CacheOperation] {
            let name = format!("{}_{}", self.namespace, family.name());
            write_metric_header(&mut output, &name, family.help(), "histogram");

            for ((_, values), histogram) in snapshot.iter().filter(|((f, _), _)| *f == family) {
                let labels: Vec<(&str, &str)> = family
                    .label_names()
                    .iter()
                    .copied()
                    .zip(values.iter().map(String::as_str))
                    .collect();

                for (bound, count) in family.buckets().iter().zip(&histogram.buckets) {
                    let le = bound.to_string();
                    let mut with_le = labels.clone();
                    with_le.push(("le", &le));
                    write_metric_value(&mut output, &format!("{name}_bucket"), &with_le, *count);
                }
                let mut with_inf = labels.clone();
                with_inf.push(("le", "+Inf"));
                write_metric_value(&mut output, &format!("{name}_bucket"), &with_inf, histogram.count);

                let _ = writeln!(
                    output,
                    "{name}_sum{{{}}} {}",
                    format_labels(&labels),
                    histogram.sum
                );
                write_metric_value(&mut output, &format!("{name}_count"), &labels, histogram.count);
            }
        }

        output
    }
}

impl MetricsSink for HistogramRegistry {
    fn record(&self, observation: Observation<'_>, elapsed: Duration) {
        let family = observation.family();
        let key = (family, observation.label_values());
        let mut series = self.series.lock();
        series
            .entry(key)
            .or_insert_with(|| Histogram::new(family.buckets().len()))
            .observe(family.buckets(), elapsed.as_secs_f64());
    }
}

fn write_metric_header(output: &mut String, name: &str, help: &str, metric_type: &str) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {metric_type}");
}

fn write_metric_value(output: &mut String, name: &str, labels: &[(&str, &str)], value: u64) {
    let _ = writeln!(output, "{name}{{{}}} {value}", format_labels(labels));
}

fn format_labels(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Escape label values for Prometheus format
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics_accepts_everything() {
        let sink = NoopMetrics;
        sink.record(Observation::query("cache", "A"), Duration::from_micros(5));
        sink.record(
            Observation::CacheOperation { operation: "get" },
            Duration::from_nanos(800),
        );
    }

    #[test]
    fn test_registry_counts_per_label_set() {
        let registry = HistogramRegistry::new("test");
        registry.record(Observation::query("block", "A"), Duration::from_micros(3));
        registry.record(Observation::query("block", "A"), Duration::from_micros(4));
        registry.record(Observation::query("block", "AAAA"), Duration::from_micros(4));

        assert_eq!(registry.sample_count(&Observation::query("block", "A")), 2);
        assert_eq!(registry.sample_count(&Observation::query("block", "AAAA")), 1);
        assert_eq!(registry.sample_count(&Observation::query("cache", "A")), 0);
        assert_eq!(registry.family_count(Family::Query), 3);
        assert_eq!(registry.family_count(Family::CacheOperation), 0);
    }

    #[test]
    fn test_registry_bucket_accumulation() {
        let registry = HistogramRegistry::new("test");
        // 2us lands in every bucket from 2.5e-6 upward
        registry.record(
            Observation::BlacklistLookup {
                bloom_filter: "maybe",
                array: "present",
            },
            Duration::from_micros(2),
        );

        let text = registry.render();
        assert!(text.contains(
            "test_blacklist_lookup_duration_seconds_bucket{bloom_filter=\"maybe\",array=\"present\",le=\"0.00000175\"} 0"
        ));
        assert!(text.contains(
            "test_blacklist_lookup_duration_seconds_bucket{bloom_filter=\"maybe\",array=\"present\",le=\"0.0000025\"} 1"
        ));
        assert!(text.contains(
            "test_blacklist_lookup_duration_seconds_bucket{bloom_filter=\"maybe\",array=\"present\",le=\"+Inf\"} 1"
        ));
        assert!(text.contains(
            "test_blacklist_lookup_duration_seconds_count{bloom_filter=\"maybe\",array=\"present\"} 1"
        ));
    }

    #[test]
    fn test_render_headers_present_without_samples() {
        let registry = HistogramRegistry::new("sinkhole");
        let text = registry.render();
        assert!(text.contains("# TYPE sinkhole_dns_queries_duration_seconds histogram"));
        assert!(text.contains("# HELP sinkhole_cache_operation_duration_seconds"));
        assert!(text.contains("# TYPE sinkhole_blacklist_lookup_duration_seconds histogram"));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("plain"), "plain");
        assert_eq!(escape_label_value("a\"b"), "a\\\"b");
        assert_eq!(escape_label_value("a\\b"), "a\\\\b");
        assert_eq!(escape_label_value("a\nb"), "a\\nb");
    }
}
