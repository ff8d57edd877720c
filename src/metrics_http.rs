//! Prometheus scrape endpoint
//!
//! Serves `GET /metrics` over HTTP/1.1 from a [`HistogramRegistry`]. Any
//! other path gets 404, any other method on `/metrics` gets 405.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::dns::metrics::HistogramRegistry;

/// Content type of the Prometheus text exposition format
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// HTTP server exposing the histogram registry
pub struct MetricsServer {
    listener: TcpListener,
    registry: Arc<HistogramRegistry>,
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl MetricsServer {
    /// Bind the endpoint to `addr`
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the listener cannot be bound.
    pub async fn bind(addr: SocketAddr, registry: Arc<HistogramRegistry>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(addr = %local_addr, "Metrics endpoint bound");

        Ok(Self {
            listener,
            registry,
            local_addr,
            shutdown_tx,
        })
    }

    /// Address the endpoint is bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a shutdown signal sender
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept scrapes until a shutdown signal is sent
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let registry = Arc::clone(&self.registry);
                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    let registry = Arc::clone(&registry);
                                    async move { Ok::<_, Infallible>(route(&req, &registry)) }
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await
                                {
                                    debug!(peer = %peer, error = %e, "Metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Metrics accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Metrics endpoint shutting down");
                    break;
                }
            }
        }
    }
}

fn route(req: &Request<Incoming>, registry: &HistogramRegistry) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut response = Response::new(Full::new(Bytes::from(registry.render())));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE));
            response
        }
        (_, "/metrics") => {
            let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
            response
        }
        _ => status_response(StatusCode::NOT_FOUND),
    }
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let reason = status.canonical_reason().unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(format!("{reason}\n"))));
    *response.status_mut() = status;
    response
}
