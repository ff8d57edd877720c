//! Service assembly
//!
//! Turns a validated [`Config`] into a ready [`QueryPipeline`] and binds the
//! DNS and metrics listeners. Every startup failure comes back as a
//! [`SinkholeError`]; the caller decides whether to abort.
//!
//! ```text
//! Config ──> validate ──> Blacklist::load ──> ResponseCache ──> UdpClient
//!                                                     │
//!                          OverrideMap::load (opt-in) ┤
//!                                                     v
//!                                              QueryPipeline
//!                                                     │
//!                       bind() ──> UdpDnsServer + MetricsServer
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::dns::metrics::{HistogramRegistry, MetricsSink};
use crate::dns::{Blacklist, OverrideMap, QueryPipeline, ResponseCache, UdpClient, UdpDnsServer};
use crate::error::SinkholeError;
use crate::metrics_http::MetricsServer;

/// Namespace prefixed to every exported metric
pub const METRICS_NAMESPACE: &str = "sinkhole";

/// Listeners bound by [`Sinkhole::bind`]
pub struct Listeners {
    /// UDP DNS server on the configured port
    pub dns: UdpDnsServer,
    /// Prometheus scrape endpoint
    pub metrics: MetricsServer,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").finish_non_exhaustive()
    }
}

/// A fully assembled resolver, not yet listening
pub struct Sinkhole {
    config: Config,
    registry: Arc<HistogramRegistry>,
    cache: Arc<ResponseCache>,
    pipeline: Arc<QueryPipeline>,
}

impl Sinkhole {
    /// Build the resolver described by `config`
    ///
    /// # Errors
    ///
    /// - `SinkholeError::Config` if `config` does not validate
    /// - `SinkholeError::Load` if the blacklist, or the override file when
    ///   overrides are enabled, cannot be loaded
    /// - `SinkholeError::Dns` if the upstream address is unusable
    pub fn from_config(config: Config) -> Result<Self, SinkholeError> {
        config.validate()?;

        let registry = Arc::new(HistogramRegistry::new(METRICS_NAMESPACE));
        let metrics: Arc<dyn MetricsSink> = registry.clone();

        let blacklist = Blacklist::load(&config.blacklist_path)?.with_metrics(Arc::clone(&metrics));

        let cache = Arc::new(
            ResponseCache::new()
                .with_metrics(Arc::clone(&metrics))
                .with_sweep_interval(config.cache_sweep_interval()),
        );

        let upstream = UdpClient::new(config.upstream.clone())?.with_timeout(config.upstream_timeout());

        let mut pipeline = QueryPipeline::new(Arc::clone(&cache), Arc::new(blacklist), Arc::new(upstream))
            .with_metrics(metrics)
            .with_verbose(config.debug);

        if config.enable_overrides {
            let overrides = OverrideMap::load(&config.override_path)?;
            info!(entries = overrides.len(), "Static overrides enabled");
            pipeline = pipeline.with_overrides(Arc::new(overrides));
        }

        Ok(Self {
            config,
            registry,
            cache,
            pipeline: Arc::new(pipeline),
        })
    }

    /// Bind the metrics endpoint, then the DNS server
    ///
    /// # Errors
    ///
    /// - `SinkholeError::Io` if the metrics port cannot be bound
    /// - `SinkholeError::Dns` if the DNS port cannot be bound
    pub async fn bind(&self) -> Result<Listeners, SinkholeError> {
        let metrics = MetricsServer::bind(self.config.metrics_addr(), Arc::clone(&self.registry)).await?;
        let dns = UdpDnsServer::bind(self.config.listen_addr(), Arc::clone(&self.pipeline)).await?;
        Ok(Listeners { dns, metrics })
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Histogram registry behind `/metrics`
    #[must_use]
    pub fn registry(&self) -> &Arc<HistogramRegistry> {
        &self.registry
    }

    /// Shared response cache
    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Shared query pipeline
    #[must_use]
    pub fn pipeline(&self) -> &Arc<QueryPipeline> {
        &self.pipeline
    }
}

impl std::fmt::Debug for Sinkhole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinkhole")
            .field("listen", &self.config.listen_addr())
            .field("upstream", &self.config.upstream)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
