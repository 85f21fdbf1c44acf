//! Common test setup functions.

use analytics_service::AnalyticsService;
use engine_core::ColumnarStore;
use ingest_buffer::{BufferConfig, EventBuffer, FlushSignal, Flusher};
use query_engine::{CachedQueries, QueryEngine, ResultCache};
use std::sync::Arc;
use std::time::Duration;
use worker::{CacheWarmer, Enricher, GeoLookup};

use crate::mocks::{MockStore, StaticGeo};

/// Test context wired the way the binary wires production.
///
/// - Real buffer, flusher, enricher, cache and service
/// - `MockStore` in place of the columnar backend
/// - `StaticGeo` in place of the MaxMind database
pub struct TestContext {
    pub store: MockStore,
    pub geo: StaticGeo,
    pub buffer: Arc<EventBuffer>,
    pub flusher: Arc<Flusher>,
    pub cache: Arc<ResultCache>,
    pub queries: CachedQueries,
    pub service: AnalyticsService,
    /// Held so the buffer's signal channel stays open.
    pub flush_signal: FlushSignal,
}

pub struct TestOptions {
    pub buffer: BufferConfig,
    pub cache_bytes: usize,
    pub cache_ttl: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            buffer: BufferConfig {
                flush_threshold: 1_000,
                max_buffered_events: 10_000,
                flush_interval_secs: 3600,
            },
            cache_bytes: 16 * 1024 * 1024,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl TestContext {
    /// Create a new test context with an empty store.
    pub async fn new() -> Self {
        Self::with_store(MockStore::new(), TestOptions::default()).await
    }

    pub async fn with_options(options: TestOptions) -> Self {
        Self::with_store(MockStore::new(), options).await
    }

    /// Create a context over a pre-populated store.
    pub async fn with_store(store: MockStore, options: TestOptions) -> Self {
        let geo = StaticGeo::new()
            .with("8.8.8.8", "United States", "US")
            .with("81.2.69.142", "United Kingdom", "GB")
            .with("5.9.0.1", "Germany", "DE");

        let last_id = store.max_id().await.expect("mock max_id");
        let (buffer, flush_signal) = EventBuffer::new(options.buffer, last_id);
        let buffer = Arc::new(buffer);
        let flusher = Arc::new(Flusher::new(
            buffer.clone(),
            Arc::new(store.clone()) as Arc<dyn ColumnarStore>,
        ));

        let enricher = Arc::new(Enricher::new(Arc::new(geo.clone()) as Arc<dyn GeoLookup>));
        let cache = Arc::new(ResultCache::new(options.cache_bytes));
        let queries = CachedQueries::new(
            QueryEngine::new(Arc::new(store.clone())),
            cache.clone(),
            options.cache_ttl,
        );
        let service = AnalyticsService::new(enricher, buffer.clone(), queries.clone());

        Self {
            store,
            geo,
            buffer,
            flusher,
            cache,
            queries,
            service,
            flush_signal,
        }
    }

    /// Flush everything buffered so far into the store.
    pub async fn flush(&self) {
        self.flusher.drain().await.expect("flush failed");
    }

    pub fn warmer(&self) -> CacheWarmer {
        CacheWarmer::new(self.queries.clone())
    }
}
