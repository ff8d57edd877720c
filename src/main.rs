//! dns-sinkhole: filtering DNS resolver
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (port 53, upstream 1.1.1.1:53)
//! sudo ./dns-sinkhole
//!
//! # Run with a configuration file
//! ./dns-sinkhole -c /etc/dns-sinkhole/config.json
//!
//! # Run with environment overrides
//! DNS_PORT=5353 UPSTREAM_DNS=9.9.9.9:53 DEBUG=true ./dns-sinkhole
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use dns_sinkhole::config::{apply_env_overrides, load_config, Config};
use dns_sinkhole::dns::{spawn_housekeeping, QueryOutcome};
use dns_sinkhole::service::Listeners;
use dns_sinkhole::Sinkhole;

/// Command-line arguments
struct Args {
    /// Configuration file path; defaults apply when absent
    config_path: Option<PathBuf>,
    /// Check configuration only
    check_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = None;
        let mut check_config = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = Some(PathBuf::from(path));
                    }
                }
                "--check" => {
                    check_config = true;
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("dns-sinkhole v{}", dns_sinkhole::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            check_config,
        }
    }
}

fn print_help() {
    println!(
        r#"dns-sinkhole v{}

Filtering DNS resolver: blacklisted domains get NXDOMAIN, everything else
is forwarded upstream and cached.

USAGE:
    dns-sinkhole [OPTIONS]

OPTIONS:
    -c, --config <PATH>     JSON configuration file (optional)
    --check                 Check configuration and exit
    -h, --help              Print help information
    -v, --version           Print version information

ENVIRONMENT:
    UPSTREAM_DNS       Upstream resolver address [default: 1.1.1.1:53]
    DNS_PORT           UDP listen port [default: 53]
    DEBUG              "true" enables debug logging and per-query logs
    PROMETHEUS_PORT    Metrics endpoint port [default: 9090]
    BLACKLIST_PATH     Sorted blacklist file [default: data/blacklist.txt]
    OVERRIDE_PATH      Static overrides file [default: data/override.txt]
    RUST_LOG           Additional tracing filter directives
"#,
        dns_sinkhole::VERSION
    );
}

/// Initialize logging
fn init_logging(config: &Config) -> Result<()> {
    let level = if config.debug { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("tokio=warn".parse()?);

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}

fn load_effective_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {path:?}"))?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config).context("Invalid environment override")?;
    Ok(config)
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();
    let args = Args::parse();

    let config = load_effective_config(&args)?;

    if args.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    init_logging(&config)?;

    info!("dns-sinkhole v{}", dns_sinkhole::VERSION);

    let sinkhole = Sinkhole::from_config(config).context("Failed to initialize dns-sinkhole")?;
    let config = sinkhole.config();
    let pipeline = Arc::clone(sinkhole.pipeline());
    let housekeeping = spawn_housekeeping(sinkhole.cache());

    let Listeners {
        dns: server,
        metrics: metrics_server,
    } = sinkhole.bind().await.context("Failed to bind listeners")?;

    let metrics_shutdown = metrics_server.shutdown_sender();
    let metrics_handle = tokio::spawn(async move { metrics_server.run().await });

    info!(
        "dns-sinkhole ready on {} (upstream {}, metrics on {}), startup took {:.2}ms",
        server.local_addr(),
        config.upstream,
        config.metrics_addr(),
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let server = Arc::new(server);
    let serving = Arc::clone(&server);
    let mut server_handle = tokio::spawn(async move { serving.run_until_shutdown(shutdown_rx).await });

    let serve_result = tokio::select! {
        result = &mut server_handle => {
            result.context("DNS server task panicked")?
        }
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, initiating shutdown...");
            let _ = shutdown_tx.send(());
            let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;
            Ok(())
        }
    };

    // Graceful shutdown
    info!("Shutting down...");
    let _ = metrics_shutdown.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), metrics_handle).await;
    housekeeping.abort();

    let stats = pipeline.stats();
    info!(
        "Final stats: {} queries, {} cache hits, {} blocked, {} forwarded, {} upstream errors",
        stats.queries(),
        stats.count(QueryOutcome::CacheHit),
        stats.count(QueryOutcome::Blocked),
        stats.count(QueryOutcome::Upstream),
        stats.count(QueryOutcome::UpstreamError),
    );
    info!("Shutdown complete");

    serve_result.map_err(|e| {
        error!(error = %e, "DNS server stopped");
        anyhow::anyhow!("DNS server error: {e}")
    })
}
