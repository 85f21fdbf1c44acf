//! Mock implementations for testing.

use async_trait::async_trait;
use engine_core::error::DbErrorCode;
use engine_core::{ColumnarStore, Error, Event, Result, ScanRequest};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use worker::geo::GeoError;
use worker::{GeoLocation, GeoLookup};

/// In-memory store that records every appended row.
///
/// Implements the same `ColumnarStore` trait as the file and ClickHouse
/// backends, so the buffer, flusher and query engine run their real code
/// paths against it.
#[derive(Clone, Default)]
pub struct MockStore {
    rows: Arc<Mutex<Vec<Event>>>,
    /// Simulate failures if set.
    should_fail: Arc<AtomicBool>,
    scans: Arc<AtomicUsize>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load rows as if they had been flushed earlier.
    pub fn with_rows(rows: Vec<Event>) -> Self {
        let store = Self::new();
        store.rows.lock().extend(rows);
        store
    }

    /// All persisted rows, in append order.
    pub fn rows(&self) -> Vec<Event> {
        self.rows.lock().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    /// Number of range scans served so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::database(DbErrorCode::StoreFailed, "mock store failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ColumnarStore for MockStore {
    async fn append_batch(&self, events: &[Event]) -> Result<usize> {
        self.check()?;
        self.rows.lock().extend_from_slice(events);
        Ok(events.len())
    }

    async fn range_scan(&self, request: &ScanRequest) -> Result<Vec<Event>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::database(DbErrorCode::QueryFailed, "mock store failure"));
        }

        let mut rows: Vec<Event> = self
            .rows
            .lock()
            .iter()
            .filter(|e| request.matches(e))
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.timestamp);
        Ok(rows)
    }

    async fn projects(&self) -> Result<Vec<String>> {
        self.check()?;
        let projects: BTreeSet<String> = self
            .rows
            .lock()
            .iter()
            .filter(|e| !e.project_id.is_empty())
            .map(|e| e.project_id.clone())
            .collect();
        Ok(projects.into_iter().collect())
    }

    async fn max_id(&self) -> Result<u64> {
        Ok(self.rows.lock().iter().map(|e| e.id).max().unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Geolocation from a fixed IP table. Unlisted addresses are not found.
#[derive(Clone, Default)]
pub struct StaticGeo {
    table: HashMap<String, GeoLocation>,
    lookups: Arc<AtomicUsize>,
}

impl StaticGeo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: &str, country: &str, country_code: &str) -> Self {
        self.table.insert(
            ip.to_string(),
            GeoLocation {
                country: country.to_string(),
                country_code: country_code.to_string(),
                city: String::new(),
            },
        );
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLookup for StaticGeo {
    async fn lookup(&self, ip: &str) -> std::result::Result<GeoLocation, GeoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(ip)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(ip.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_mock_store_captures_rows() {
        let store = MockStore::new();
        let written = store
            .append_batch(&[fixtures::event_at(1, fixtures::minutes_ago(5))])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.max_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mock_store_failure_mode() {
        let store = MockStore::new();
        store.set_should_fail(true);

        let err = store
            .append_batch(&[fixtures::event_at(1, fixtures::minutes_ago(5))])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some("DB_001"));
        assert_eq!(store.row_count(), 0);

        store.set_should_fail(false);
        assert!(store.range_scan(&ScanRequest::all()).await.is_ok());
    }

    #[tokio::test]
    async fn test_static_geo() {
        let geo = StaticGeo::new().with("8.8.8.8", "United States", "US");

        assert_eq!(geo.lookup("8.8.8.8").await.unwrap().country_code, "US");
        assert!(geo.lookup("10.0.0.1").await.is_err());
        assert_eq!(geo.lookup_or_default("10.0.0.1").await.country, "Unknown");
        assert_eq!(geo.lookup_count(), 3);
    }
}
