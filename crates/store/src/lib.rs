//! Durable columnar event storage.
//!
//! Two backends implement [`engine_core::ColumnarStore`]: a single-file
//! column table for standalone deployments and ClickHouse for larger ones.

pub mod clickhouse_store;
pub mod client;
pub mod columns;
pub mod config;
pub mod file;
pub mod insert;
pub mod query;

pub use clickhouse_store::ClickHouseStore;
pub use client::*;
pub use config::*;
pub use file::{FileStore, FileStoreConfig};

use engine_core::{ColumnarStore, Result};
use std::sync::Arc;
use telemetry::health;
use tracing::{info, warn};

/// Open the configured backend and record its health.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ColumnarStore>> {
    let store: Arc<dyn ColumnarStore> = match config.backend {
        StorageBackend::File => {
            let store = FileStore::open(&config.file).await.inspect_err(|e| {
                health().storage.set_unhealthy(e.to_string());
            })?;
            health().storage.set_healthy();
            Arc::new(store)
        }
        StorageBackend::Clickhouse => {
            let store = ClickHouseStore::new(&config.clickhouse);
            if store.client().ping().await {
                health().storage.set_healthy();
            } else {
                warn!("ClickHouse unreachable at startup, continuing");
                health()
                    .storage
                    .set_unhealthy("ClickHouse unreachable at startup");
            }
            Arc::new(store)
        }
    };

    info!(backend = store.backend_name(), "Event store ready");
    Ok(store)
}
