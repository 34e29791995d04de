//! Shell Cache - Offline-capable caching proxy for a web app shell and its data APIs

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LogFormat, LoggingConfig, StorageBackendKind};
use shellcache_api::{AppState, create_router};
use shellcache_core::{
    CacheStore, Clock, CoreError, Interceptor, LifecycleManager, PhaseGate, SystemClock,
};
use shellcache_db::Database;
use shellcache_proxy::{Fetcher, HttpFetcher};
use shellcache_storage::{LocalStorage, MemoryStorage, StorageBackend};

/// Install attempts before giving up on startup
const INSTALL_ATTEMPTS: u32 = 3;
const INSTALL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Shell Cache - Offline-capable caching proxy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "SHELLCACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "SHELLCACHE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Shell Cache v{}", env!("CARGO_PKG_VERSION"));

    let cache_config = Arc::new(config.cache_config()?);

    // Initialize storage backend
    let storage: Arc<dyn StorageBackend> = match config.storage.backend {
        StorageBackendKind::Local => {
            tokio::fs::create_dir_all(&config.storage.path).await?;
            Arc::new(LocalStorage::new(&config.storage.path).await?)
        }
        StorageBackendKind::Memory => {
            warn!("Using in-memory body storage; the cache will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
    };

    // Initialize database
    if let Some(parent) = Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let db = Database::new(&config.database_url()).await?;

    let store = Arc::new(CacheStore::new(db, storage));
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.fetcher_config())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gate = PhaseGate::new();

    // Install the shell, then evict namespaces from earlier versions
    let lifecycle = Arc::new(LifecycleManager::new(
        cache_config.clone(),
        store.clone(),
        fetcher.clone(),
        clock.clone(),
        gate.clone(),
    ));
    install_with_retry(&lifecycle).await?;
    lifecycle.activate().await?;

    let interceptor = Interceptor::new(cache_config.clone(), store.clone(), fetcher, clock, gate)?;

    // Metrics
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();

    // Create application state
    let state = AppState::new(cache_config.clone(), store, interceptor, lifecycle);

    // Create router
    let app = create_router(state, Some(Arc::new(metrics_handle))).layer(TraceLayer::new_for_http());

    // Determine bind address
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);
    info!(
        "Shell origin: {} (static: {}, dynamic: {}, max age: {:?})",
        cache_config.origin,
        cache_config.static_namespace,
        cache_config.dynamic_namespace,
        cache_config.dynamic_max_age
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Run install, retrying population failures a few times
async fn install_with_retry(lifecycle: &LifecycleManager) -> Result<()> {
    let mut attempt = 1;
    loop {
        match lifecycle.install().await {
            Ok(_) => return Ok(()),
            Err(e @ CoreError::InstallPopulation { .. }) if attempt < INSTALL_ATTEMPTS => {
                warn!(
                    "Install attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, INSTALL_ATTEMPTS, e, INSTALL_RETRY_DELAY
                );
                tokio::time::sleep(INSTALL_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => return Err(e).context("Shell installation failed"),
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!(
        "shellcache_requests_total",
        "Intercepted requests by request class"
    );
    metrics::describe_counter!(
        "shellcache_cache_hits_total",
        "Responses served from a cache namespace"
    );
    metrics::describe_counter!(
        "shellcache_stale_served_total",
        "Stale dynamic entries served after a failed refresh"
    );
    metrics::describe_counter!(
        "shellcache_offline_fallbacks_total",
        "Requests answered with the offline fallback"
    );
    metrics::describe_counter!(
        "shellcache_network_failures_total",
        "Outbound fetches that produced no response"
    );
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
