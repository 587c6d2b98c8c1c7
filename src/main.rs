//! KratOs Peer Map Service
//!
//! Polls a network's peer list, geolocates every peer IP, resolves city
//! coordinates and serves the result as a peer table and a heat map.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    KRATOS PEER MAP                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Poll Loop (20s)           ←── Fetches the network peer list│
//! │  Peer Normalizer           ←── IP → country/city lookups    │
//! │  Geo Cache (RocksDB)       ←── Persists lookups by IP       │
//! │  Coordinate Resolver       ←── city,country → lat/lon       │
//! │  Aggregator                ←── Versions, heat map, rankings │
//! │  HTTP API (8090)           ←── Views, network switch, metrics│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

mod aggregator;
mod api;
mod config;
mod error;
mod format;
mod normalizer;
mod poller;
mod resolver;
mod sources;
mod store;
mod types;

#[cfg(test)]
mod testing;

use api::Metrics;
use config::PeerMapConfig;
use normalizer::PeerNormalizer;
use poller::{run_poll_loop, Poller};
use resolver::CoordinateResolver;
use sources::{HttpPeerSource, IpInfoClient, NominatimClient};
use store::GeoCacheStore;
use types::Dashboard;

/// KratOs Peer Map - Geographic view of network peers
#[derive(Parser, Debug)]
#[command(name = "kratos-peer-map")]
#[command(author = "KratOs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Peer geolocation and heat map service for KratOs networks", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "peer-map.toml")]
    config: PathBuf,

    /// Data directory for the geo cache
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Network to poll at startup
    #[arg(short, long)]
    network: Option<String>,

    /// Base URL of the peer list endpoint
    #[arg(long)]
    peer_endpoint: Option<String>,

    /// HTTP API port
    #[arg(long)]
    api_port: Option<u16>,

    /// Seconds between poll cycles
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into())
        )
        .init();

    info!("🌐 KratOs Peer Map v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        PeerMapConfig::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        PeerMapConfig::default()
    };

    // Override config with CLI args
    let config = config
        .with_network(args.network)
        .with_peer_endpoint(args.peer_endpoint)
        .with_api_port(args.api_port)
        .with_poll_interval(args.poll_interval);

    config.validate()?;

    // Handle config generation
    if args.init_config {
        config.save(&args.config)?;
        info!("📝 Configuration written to {:?}", args.config);
        return Ok(());
    }

    info!("⚙️  Configuration:");
    info!("   Network: {}", config.network);
    info!("   Peer endpoint: {}", config.peer_endpoint);
    info!("   Geolocation: {}", config.geolocation_url);
    info!("   Geocoding: {}", config.geocoding_url);
    info!("   Poll interval: {}s", config.poll_interval_secs);
    info!("   API port: {}", config.api_port);

    let shared_config = Arc::new(config);

    // Open geo cache
    tokio::fs::create_dir_all(&args.data_dir).await?;
    let cache_path = args.data_dir.join("geo_cache");
    let store = Arc::new(GeoCacheStore::open(&cache_path)?);
    info!("📦 Geo cache opened at {:?}", cache_path);

    // External collaborators share one client
    let client = sources::build_http_client(&shared_config)?;
    let source = Arc::new(HttpPeerSource::new(
        client.clone(),
        shared_config.peer_endpoint.clone(),
    ));
    let geolocator = Arc::new(IpInfoClient::new(
        client.clone(),
        shared_config.geolocation_url.clone(),
    ));
    let geocoder = Arc::new(NominatimClient::new(
        client,
        shared_config.geocoding_url.clone(),
    ));

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    // Pipeline
    let dashboard = Arc::new(RwLock::new(Dashboard::default()));
    let poller = Arc::new(Poller::new(
        source,
        PeerNormalizer::new(store.clone(), geolocator, metrics.clone()),
        CoordinateResolver::new(store.clone(), geocoder, metrics.clone()),
        dashboard,
        metrics.clone(),
    ));

    let dashboard = poller.dashboard();
    let (network_tx, network_rx) = watch::channel(shared_config.network.clone());

    // Start all services concurrently
    let poll_handle = tokio::spawn(run_poll_loop(
        poller,
        network_rx,
        shared_config.poll_interval_secs,
    ));

    let api_handle = tokio::spawn(api::run_api_server(
        shared_config.clone(),
        dashboard,
        metrics,
        network_tx,
    ));

    info!("✅ All services started");
    info!("   Press Ctrl+C to shutdown gracefully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = poll_handle => {
            error!("Poll loop exited: {:?}", result);
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    // Graceful shutdown: flush geo cache
    store.flush()?;
    info!("📦 Geo cache flushed to disk");

    info!("👋 KratOs Peer Map shutting down");
    Ok(())
}
