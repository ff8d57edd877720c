//! Query pipeline
//!
//! Every query walks one linear decision path and stops at the first stage
//! that settles it:
//!
//! ```text
//! Incoming Message
//!     |
//!     v
//! Validate: QR=0? ── no ──> dropped                             (ignored)
//!           opcode QUERY? ── no ──> NOTIMP reply                 (not_implemented)
//!           exactly one question? ── no ──> FORMERR reply        (malformed_query)
//!     |
//!     v
//! Normalize: ASCII (punycode) domain without trailing dot + type label
//!     |
//!     v
//! ResponseCache::get ── hit ──> cached answers                  (cache)
//!     |
//!     v
//! OverrideMap (only if attached, A only) ── match ──> A record  (override)
//!     |
//!     v
//! Blacklist::contains ── blocked ──> NXDOMAIN reply              (block)
//!     |
//!     v
//! DnsUpstream::exchange ── ok ──> upstream reply, cache it       (upstream)
//!                        └─ err ─> no reply                      (upstream_error)
//! ```
//!
//! The cache is consulted before the blacklist: an answer only reaches the
//! cache after passing the blacklist, so a cache hit is known to be allowed.
//!
//! Failures to write a reply are logged and counted; they never change the
//! outcome and are not retried. Upstream failures are not retried here.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::op::{Header, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{rdata, RData, Record, RecordType};
use tracing::{debug, info, warn};

use super::writer::ResponseWriter;
use crate::dns::cache::ResponseCache;
use crate::dns::client::DnsUpstream;
use crate::dns::error::DnsError;
use crate::dns::filter::{Blacklist, OverrideMap};
use crate::dns::metrics::{MetricsSink, NoopMetrics, Observation};

/// TTL of answers synthesized from the override map
pub const OVERRIDE_TTL: u32 = 60;

/// How a query was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOutcome {
    /// A response or other non-query message; dropped without a reply
    Ignored,
    /// Opcode other than QUERY; answered with NOTIMP
    NotImplemented,
    /// Not exactly one question; answered with FORMERR
    Malformed,
    /// Answered from the response cache
    CacheHit,
    /// Answered from the static override map
    Override,
    /// Domain is blacklisted; answered with NXDOMAIN
    Blocked,
    /// Forwarded upstream and the reply relayed
    Upstream,
    /// Upstream exchange failed; no reply sent
    UpstreamError,
}

impl QueryOutcome {
    /// Label used in logs and the `status` metric label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::NotImplemented => "not_implemented",
            Self::Malformed => "malformed_query",
            Self::CacheHit => "cache",
            Self::Override => "override",
            Self::Blocked => "block",
            Self::Upstream => "upstream",
            Self::UpstreamError => "upstream_error",
        }
    }

    /// Whether a reply is sent to the client for this outcome
    #[must_use]
    pub fn sends_reply(self) -> bool {
        !matches!(self, Self::Ignored | Self::UpstreamError)
    }
}

impl std::fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-outcome counters for the pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    queries: AtomicU64,
    ignored: AtomicU64,
    not_implemented: AtomicU64,
    malformed: AtomicU64,
    cache_hits: AtomicU64,
    overrides: AtomicU64,
    blocked: AtomicU64,
    upstream: AtomicU64,
    upstream_errors: AtomicU64,
    write_errors: AtomicU64,
}

impl PipelineStats {
    fn counter(&self, outcome: QueryOutcome) -> &AtomicU64 {
        match outcome {
            QueryOutcome::Ignored => &self.ignored,
            QueryOutcome::NotImplemented => &self.not_implemented,
            QueryOutcome::Malformed => &self.malformed,
            QueryOutcome::CacheHit => &self.cache_hits,
            QueryOutcome::Override => &self.overrides,
            QueryOutcome::Blocked => &self.blocked,
            QueryOutcome::Upstream => &self.upstream,
            QueryOutcome::UpstreamError => &self.upstream_errors,
        }
    }

    /// Queries handled
    #[must_use]
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Queries settled with `outcome`
    #[must_use]
    pub fn count(&self, outcome: QueryOutcome) -> u64 {
        self.counter(outcome).load(Ordering::Relaxed)
    }

    /// Replies that could not be written
    #[must_use]
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }
}

/// The query-handling state machine
///
/// Shared by every in-flight query; all state it touches is either
/// immutable ([`Blacklist`], [`OverrideMap`]) or internally synchronized
/// ([`ResponseCache`]).
pub struct QueryPipeline {
    cache: Arc<ResponseCache>,
    blacklist: Arc<Blacklist>,
    upstream: Arc<dyn DnsUpstream>,
    overrides: Option<Arc<OverrideMap>>,
    metrics: Arc<dyn MetricsSink>,
    verbose: bool,
    stats: PipelineStats,
}

impl QueryPipeline {
    /// Create a pipeline without overrides, metrics or per-query logging
    #[must_use]
    pub fn new(
        cache: Arc<ResponseCache>,
        blacklist: Arc<Blacklist>,
        upstream: Arc<dyn DnsUpstream>,
    ) -> Self {
        Self {
            cache,
            blacklist,
            upstream,
            overrides: None,
            metrics: Arc::new(NoopMetrics),
            verbose: false,
            stats: PipelineStats::default(),
        }
    }

    /// Answer A queries for domains in `overrides` after a cache miss
    #[must_use]
    pub fn with_overrides(mut self, overrides: Arc<OverrideMap>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Report query latency to `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Log every answered query at info level
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Pipeline counters
    #[must_use]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Handle one query and write the reply, if any, to `writer`
    pub async fn handle(&self, writer: &mut dyn ResponseWriter, query: &Message) -> QueryOutcome {
        let start = Instant::now();
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let question = match validate_query(query) {
            Ok(question) => question,
            Err((outcome, e)) => {
                debug!(
                    client = %writer.peer(),
                    query_id = ?e.query_id(),
                    error = %e,
                    "Rejecting DNS message"
                );
                let code = match outcome {
                    QueryOutcome::Ignored => {
                        return self.finish(outcome, "-", "-", start, None);
                    }
                    QueryOutcome::NotImplemented => ResponseCode::NotImp,
                    _ => ResponseCode::FormErr,
                };
                let response = reply_to(query, code);
                self.respond(writer, &response).await;
                return self.finish(outcome, "-", "-", start, Some(&response));
            }
        };

        // wire form, so IDN labels stay punycode like the blacklist entries
        let qname = question.name().to_ascii();
        let domain = qname.trim_end_matches('.');
        let qtype = question.query_type().to_string();

        if let Some(cached) = self.cache.get(question) {
            let mut response = reply_to(query, ResponseCode::NoError);
            response.set_recursion_available(cached.recursion_available());
            response.add_answers(cached.answers().iter().cloned());
            response.add_name_servers(cached.name_servers().iter().cloned());
            response.add_additionals(cached.additionals().iter().cloned());
            self.respond(writer, &response).await;
            return self.finish(QueryOutcome::CacheHit, &qtype, domain, start, Some(&response));
        }

        if let Some(address) = self.override_for(question, domain) {
            let mut response = reply_to(query, ResponseCode::NoError);
            response.add_answer(Record::from_rdata(
                question.name().clone(),
                OVERRIDE_TTL,
                RData::A(rdata::A(address)),
            ));
            self.respond(writer, &response).await;
            return self.finish(QueryOutcome::Override, &qtype, domain, start, Some(&response));
        }

        if self.blacklist.contains(domain) {
            let response = reply_to(query, ResponseCode::NXDomain);
            self.respond(writer, &response).await;
            return self.finish(QueryOutcome::Blocked, &qtype, domain, start, Some(&response));
        }

        match self.upstream.exchange(query).await {
            Ok(reply) => {
                // stored before the write so a client's follow-up query hits it
                if let Some(first) = reply.message.answers().first() {
                    let ttl = Duration::from_secs(u64::from(first.ttl()));
                    self.cache.set(question, reply.message.clone(), ttl);
                }
                self.respond(writer, &reply.message).await;
                self.finish_upstream(&qtype, domain, start, &reply.message, reply.rtt)
            }
            Err(e) => {
                warn!(
                    qname = %domain,
                    qtype = %qtype,
                    upstream = %self.upstream.tag(),
                    timeout = e.is_timeout(),
                    error = %e,
                    "Failed to resolve query against upstream"
                );
                self.finish(QueryOutcome::UpstreamError, &qtype, domain, start, None)
            }
        }
    }

    fn override_for(&self, question: &Query, domain: &str) -> Option<Ipv4Addr> {
        let overrides = self.overrides.as_ref()?;
        if question.query_type() != RecordType::A {
            return None;
        }
        overrides.lookup(domain)
    }

    async fn respond(&self, writer: &mut dyn ResponseWriter, response: &Message) {
        if let Err(e) = writer.write_message(response).await {
            self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                client = %writer.peer(),
                id = response.id(),
                error = %e,
                "Failed to write DNS response to client"
            );
        }
    }

    fn finish(
        &self,
        outcome: QueryOutcome,
        qtype: &str,
        domain: &str,
        start: Instant,
        response: Option<&Message>,
    ) -> QueryOutcome {
        let elapsed = start.elapsed();
        self.stats.counter(outcome).fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record(Observation::query(outcome.label(), qtype), elapsed);

        if self.verbose {
            if let Some(response) = response {
                info!(
                    tag = outcome.label(),
                    qname = %domain,
                    qtype = %qtype,
                    rcode = %response.response_code(),
                    answers = response.answers().len(),
                    duration = ?elapsed,
                    "Answered query"
                );
            }
        }
        outcome
    }

    fn finish_upstream(
        &self,
        qtype: &str,
        domain: &str,
        start: Instant,
        response: &Message,
        rtt: Duration,
    ) -> QueryOutcome {
        if self.verbose {
            debug!(qname = %domain, rtt = ?rtt, "Upstream round trip");
        }
        self.finish(QueryOutcome::Upstream, qtype, domain, start, Some(response))
    }
}

impl std::fmt::Debug for QueryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("blacklist", &self.blacklist)
            .field("cache", &self.cache)
            .field("upstream", &self.upstream.address())
            .field("overrides", &self.overrides.as_ref().map(|o| o.len()))
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// Check that `query` is a standard query with exactly one question
///
/// On failure returns the outcome to settle the message with and the reason.
fn validate_query(query: &Message) -> Result<&Query, (QueryOutcome, DnsError)> {
    if query.message_type() != MessageType::Query {
        return Err((
            QueryOutcome::Ignored,
            DnsError::invalid_query_id("expected query, got response", query.id()),
        ));
    }

    if query.op_code() != OpCode::Query {
        return Err((
            QueryOutcome::NotImplemented,
            DnsError::invalid_query_id(
                format!("unsupported opcode: {:?}", query.op_code()),
                query.id(),
            ),
        ));
    }

    match query.queries() {
        [question] => Ok(question),
        questions => Err((
            QueryOutcome::Malformed,
            DnsError::invalid_query_id(
                format!("expected exactly one question, got {}", questions.len()),
                query.id(),
            ),
        )),
    }
}

/// Reply skeleton: request header turned into a response, first question echoed
fn reply_to(request: &Message, code: ResponseCode) -> Message {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(code);

    let mut response = Message::new();
    response.set_header(header);
    if let Some(question) = request.queries().first() {
        response.add_query(question.clone());
    }
    response
}
