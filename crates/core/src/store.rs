//! Abstract durable columnar store.
//!
//! The buffer appends batches; the query engine scans ranges. Backends decide
//! the physical layout.

use async_trait::async_trait;

use crate::events::Event;
use crate::filter::{DateRange, QueryFilter};
use crate::Result;

/// A range scan with equality predicates.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// `None` scans everything.
    pub range: Option<DateRange>,
    pub filter: QueryFilter,
}

impl ScanRequest {
    pub fn range(range: DateRange, filter: &QueryFilter) -> Self {
        Self {
            range: Some(range),
            filter: filter.clone(),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.range.map_or(true, |r| r.contains(event.timestamp)) && self.filter.matches(event)
    }
}

#[async_trait]
pub trait ColumnarStore: Send + Sync {
    /// Durably merge a batch into the store. Either every row lands or none do.
    async fn append_batch(&self, events: &[Event]) -> Result<usize>;

    /// Rows matching the request, ordered by timestamp ascending.
    async fn range_scan(&self, request: &ScanRequest) -> Result<Vec<Event>>;

    /// Number of rows matching the request.
    async fn count(&self, request: &ScanRequest) -> Result<u64> {
        Ok(self.range_scan(request).await?.len() as u64)
    }

    /// Distinct non-empty project IDs, sorted.
    async fn projects(&self) -> Result<Vec<String>>;

    /// Largest event ID stored, 0 when empty.
    async fn max_id(&self) -> Result<u64>;

    fn backend_name(&self) -> &'static str;
}
