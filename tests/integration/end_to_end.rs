//! End-to-end tests over loopback UDP
//!
//! Client socket -> UdpDnsServer -> QueryPipeline -> UdpClient -> mock upstream

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dns_sinkhole::dns::metrics::{Family, HistogramRegistry, Observation};
use dns_sinkhole::dns::{Blacklist, OverrideMap, QueryPipeline, ResponseCache, UdpClient, UdpDnsServer};
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{rdata, Name, RData, Record, RecordType};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

/// Name the mock upstream never answers
const SILENT_NAME: &str = "slow.test.";

// ============================================================================
// Mock upstream
// ============================================================================

/// Answers every A/AAAA query with one A record (TTL 300), except
/// [`SILENT_NAME`], which is swallowed.
struct MockUpstream {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
}

impl MockUpstream {
    async fn spawn() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&queries);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let Ok(query) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                let name = query.queries()[0].name().clone();
                if name == Name::from_str(SILENT_NAME).unwrap() {
                    continue;
                }

                let mut response = query.clone();
                response.set_message_type(MessageType::Response);
                response.set_recursion_available(true);
                response.add_answer(Record::from_rdata(
                    name,
                    300,
                    RData::A(rdata::A(Ipv4Addr::new(203, 0, 113, 7))),
                ));
                let _ = socket.send_to(&response.to_vec().unwrap(), peer).await;
            }
        });

        Self { addr, queries }
    }

    fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    server_addr: SocketAddr,
    upstream: MockUpstream,
    registry: Arc<HistogramRegistry>,
    _shutdown: oneshot::Sender<()>,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(None).await
    }

    async fn start_with(overrides: Option<OverrideMap>) -> Self {
        let upstream = MockUpstream::spawn().await;
        let registry = Arc::new(HistogramRegistry::new("sinkhole"));

        let blacklist = Blacklist::from_sorted(vec![
            "ads.example.com".to_string(),
            "tracker.example.net".to_string(),
        ])
        .with_metrics(registry.clone());
        let client = UdpClient::new(upstream.addr.to_string())
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        let mut pipeline = QueryPipeline::new(
            Arc::new(ResponseCache::new().with_metrics(registry.clone())),
            Arc::new(blacklist),
            Arc::new(client),
        )
        .with_metrics(registry.clone());
        if let Some(overrides) = overrides {
            pipeline = pipeline.with_overrides(Arc::new(overrides));
        }

        let server = UdpDnsServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(pipeline))
            .await
            .unwrap();
        let server_addr = server.local_addr();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move { server.run_until_shutdown(rx).await });

        Self {
            server_addr,
            upstream,
            registry,
            _shutdown: tx,
        }
    }

    /// Send `query` and wait up to `wait` for a reply
    async fn exchange(&self, query: &Message, wait: Duration) -> Option<Message> {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(&query.to_vec().unwrap(), self.server_addr)
            .await
            .unwrap();

        let mut buf = vec![0u8; 4096];
        match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(Message::from_vec(&buf[..len]).unwrap()),
            _ => None,
        }
    }

    async fn resolve(&self, query: &Message) -> Message {
        self.exchange(query, Duration::from_secs(2))
            .await
            .expect("expected a reply")
    }
}

/// Metrics are recorded after the reply is written; give the server task a moment
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn create_query(domain: &str, record_type: RecordType, id: u16) -> Message {
    let mut message = Message::new();
    message.set_id(id);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(domain).unwrap(), record_type));
    message
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_blacklisted_domain_gets_nxdomain() {
    let harness = Harness::start().await;

    let reply = harness
        .resolve(&create_query("Ads.Example.COM.", RecordType::A, 0x0A01))
        .await;

    assert_eq!(reply.id(), 0x0A01);
    assert_eq!(reply.message_type(), MessageType::Response);
    assert_eq!(reply.response_code(), ResponseCode::NXDomain);
    assert!(reply.answers().is_empty());
    assert_eq!(reply.queries().len(), 1);
    assert_eq!(harness.upstream.query_count(), 0);
}

#[tokio::test]
async fn test_allowed_domain_forwarded_then_cached() {
    let harness = Harness::start().await;

    let first = harness
        .resolve(&create_query("www.example.com.", RecordType::A, 0x0B01))
        .await;
    assert_eq!(first.id(), 0x0B01);
    assert_eq!(first.response_code(), ResponseCode::NoError);
    assert_eq!(first.answers().len(), 1);
    assert_eq!(first.answers()[0].ttl(), 300);
    assert_eq!(harness.upstream.query_count(), 1);

    let second = harness
        .resolve(&create_query("www.example.com.", RecordType::A, 0x0B02))
        .await;
    assert_eq!(second.id(), 0x0B02);
    assert_eq!(second.answers(), first.answers());
    assert_eq!(harness.upstream.query_count(), 1);

    settle().await;
    assert_eq!(
        harness.registry.sample_count(&Observation::query("upstream", "A")),
        1
    );
    assert_eq!(
        harness.registry.sample_count(&Observation::query("cache", "A")),
        1
    );
}

#[tokio::test]
async fn test_cache_is_per_record_type() {
    let harness = Harness::start().await;

    harness
        .resolve(&create_query("www.example.com.", RecordType::A, 1))
        .await;
    harness
        .resolve(&create_query("www.example.com.", RecordType::AAAA, 2))
        .await;
    assert_eq!(harness.upstream.query_count(), 2);
}

#[tokio::test]
async fn test_query_without_question_gets_formerr() {
    let harness = Harness::start().await;

    let mut query = Message::new();
    query.set_id(0x0C01);
    let reply = harness.resolve(&query).await;

    assert_eq!(reply.id(), 0x0C01);
    assert_eq!(reply.response_code(), ResponseCode::FormErr);
    assert_eq!(harness.upstream.query_count(), 0);

    settle().await;
    assert_eq!(
        harness
            .registry
            .sample_count(&Observation::query("malformed_query", "-")),
        1
    );
}

#[tokio::test]
async fn test_response_datagram_not_reflected() {
    let harness = Harness::start().await;

    let mut message = create_query("www.example.com.", RecordType::A, 0x0C02);
    message.set_message_type(MessageType::Response);
    let reply = harness.exchange(&message, Duration::from_millis(300)).await;

    assert!(reply.is_none());
    assert_eq!(harness.upstream.query_count(), 0);
    assert_eq!(
        harness.registry.sample_count(&Observation::query("ignored", "-")),
        1
    );
}

#[tokio::test]
async fn test_upstream_timeout_sends_no_reply() {
    let harness = Harness::start().await;

    let reply = harness
        .exchange(
            &create_query(SILENT_NAME, RecordType::A, 0x0D01),
            Duration::from_millis(600),
        )
        .await;

    assert!(reply.is_none());
    assert_eq!(harness.upstream.query_count(), 1);
    assert_eq!(
        harness
            .registry
            .sample_count(&Observation::query("upstream_error", "A")),
        1
    );
}

#[tokio::test]
async fn test_concurrent_clients() {
    let harness = Arc::new(Harness::start().await);

    let mut handles = Vec::new();
    for i in 0..16u16 {
        let harness = Arc::clone(&harness);
        handles.push(tokio::spawn(async move {
            let domain = if i % 2 == 0 {
                "tracker.example.net.".to_string()
            } else {
                format!("host{i}.example.com.")
            };
            let reply = harness
                .resolve(&create_query(&domain, RecordType::A, 0x1000 + i))
                .await;
            (i, reply)
        }));
    }

    for handle in handles {
        let (i, reply) = handle.await.unwrap();
        assert_eq!(reply.id(), 0x1000 + i);
        if i % 2 == 0 {
            assert_eq!(reply.response_code(), ResponseCode::NXDomain);
        } else {
            assert_eq!(reply.answers().len(), 1);
        }
    }
    assert_eq!(harness.upstream.query_count(), 8);

    settle().await;
    assert_eq!(harness.registry.family_count(Family::Query), 16);
}

#[tokio::test]
async fn test_blacklist_lookups_are_instrumented() {
    let harness = Harness::start().await;

    harness
        .resolve(&create_query("ads.example.com.", RecordType::A, 1))
        .await;

    assert_eq!(
        harness.registry.sample_count(&Observation::BlacklistLookup {
            bloom_filter: "maybe",
            array: "present",
        }),
        1
    );
    assert!(harness.registry.render().contains(
        "sinkhole_blacklist_lookup_duration_seconds_count{bloom_filter=\"maybe\",array=\"present\"} 1"
    ));
}

#[tokio::test]
async fn test_override_answers_without_upstream() {
    let mut overrides = OverrideMap::new();
    overrides.insert("router.lan", Ipv4Addr::new(192, 168, 1, 1));
    let harness = Harness::start_with(Some(overrides)).await;

    let reply = harness
        .resolve(&create_query("router.lan.", RecordType::A, 0x0E01))
        .await;

    assert_eq!(reply.response_code(), ResponseCode::NoError);
    assert_eq!(
        reply.answers()[0].data(),
        Some(&RData::A(rdata::A(Ipv4Addr::new(192, 168, 1, 1))))
    );
    assert_eq!(harness.upstream.query_count(), 0);
}
