//! Self-hosted web analytics engine.
//!
//! Wires the pipeline together:
//! - Event enrichment (bot, channel, geolocation, user agent)
//! - Buffered writes flushed to the columnar store
//! - Cached aggregate queries and a background cache warmer

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use analytics_service::AnalyticsService;
use event_store::{open_store, StorageBackend, StorageConfig};
use ingest_buffer::{BufferConfig, EventBuffer, Flusher};
use query_engine::{CacheConfig, CachedQueries, QueryEngine, ResultCache};
use telemetry::{init_tracing, TracingConfig};
use worker::{open_geo, CacheWarmer, Enricher, GeoConfig, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    tracing: TracingConfig,

    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    buffer: BufferConfig,

    #[serde(default)]
    cache: CacheConfig,

    #[serde(default)]
    geo: GeoConfig,

    #[serde(default)]
    workers: WorkerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config()?;
    init_tracing(&config.tracing);

    info!("Starting analytics engine v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config.storage)
        .await
        .context("Failed to open event store")?;

    // IDs continue from whatever is already persisted
    let last_id = store.max_id().await.context("Failed to read last event ID")?;
    let (buffer, flush_signal) = EventBuffer::new(config.buffer.clone(), last_id);
    let buffer = Arc::new(buffer);
    let flusher = Arc::new(Flusher::new(buffer.clone(), store.clone()));

    let geo = open_geo(&config.geo).await;
    let enricher = Arc::new(Enricher::new(geo));

    let cache = Arc::new(ResultCache::from_config(&config.cache));
    let queries = CachedQueries::new(QueryEngine::new(store.clone()), cache.clone(), config.cache.ttl());

    let service = AnalyticsService::new(enricher, buffer.clone(), queries.clone());

    let mut scheduler = WorkerScheduler::new(config.workers.clone());
    scheduler.start_flusher(flusher, flush_signal, config.buffer.flush_interval());
    scheduler.start_cache_tasks(cache, &config.cache);
    scheduler.start_warmer(Arc::new(CacheWarmer::new(queries)));

    info!(
        backend = store.backend_name(),
        last_id = last_id,
        flush_threshold = config.buffer.flush_threshold,
        tasks = ?scheduler.task_names(),
        "Analytics engine ready"
    );

    shutdown_signal().await;

    info!("Shutting down...");

    // Stops the warmer and cache tasks, then drains the buffer
    scheduler.stop().await;

    let status = service.status();
    if status.buffered_events > 0 {
        error!(
            remaining = status.buffered_events,
            "Events still buffered after final flush"
        );
    }
    info!(
        flushed = status.metrics.events_flushed,
        flush_errors = status.metrics.flush_errors,
        cache_hit_rate = status.cache.hit_rate,
        "Shutdown complete"
    );
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ANALYTICS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat aliases for the settings most deployments touch
    if let Ok(backend) = std::env::var("ANALYTICS_STORAGE_BACKEND") {
        config.storage.backend = match backend.to_lowercase().as_str() {
            "clickhouse" => StorageBackend::Clickhouse,
            _ => StorageBackend::File,
        };
    }
    if let Ok(dir) = std::env::var("ANALYTICS_DATA_DIR") {
        config.storage.file.data_dir = dir.into();
    }
    if let Ok(url) = std::env::var("ANALYTICS_CLICKHOUSE_URL") {
        config.storage.clickhouse.url = url;
    }
    if let Ok(username) = std::env::var("ANALYTICS_CLICKHOUSE_USERNAME") {
        config.storage.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("ANALYTICS_CLICKHOUSE_PASSWORD") {
        config.storage.clickhouse.password = Some(password);
    }
    if let Ok(path) = std::env::var("ANALYTICS_GEO_DATABASE") {
        config.geo.database_path = path.into();
    }
    if let Ok(url) = std::env::var("ANALYTICS_GEO_DOWNLOAD_URL") {
        config.geo.download_url = Some(url);
    }
    if std::env::var("LOG_JSON").is_ok() {
        config.tracing.json = TracingConfig::from_env().json;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
