//! ClickHouse-backed columnar store.

use async_trait::async_trait;
use engine_core::{ColumnarStore, Event, Result, ScanRequest};

use crate::client::ClickHouseClient;
use crate::config::ClickHouseConfig;
use crate::{insert, query};

pub struct ClickHouseStore {
    client: ClickHouseClient,
}

impl ClickHouseStore {
    pub fn new(config: &ClickHouseConfig) -> Self {
        Self {
            client: ClickHouseClient::new(config),
        }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }
}

#[async_trait]
impl ColumnarStore for ClickHouseStore {
    async fn append_batch(&self, events: &[Event]) -> Result<usize> {
        insert::insert_events(&self.client, events).await
    }

    async fn range_scan(&self, request: &ScanRequest) -> Result<Vec<Event>> {
        query::scan_events(&self.client, request).await
    }

    async fn count(&self, request: &ScanRequest) -> Result<u64> {
        query::count_events(&self.client, request).await
    }

    async fn projects(&self) -> Result<Vec<String>> {
        query::distinct_projects(&self.client).await
    }

    async fn max_id(&self) -> Result<u64> {
        query::max_event_id(&self.client).await
    }

    fn backend_name(&self) -> &'static str {
        "clickhouse"
    }
}
