//! Service façade for the analytics engine.
//!
//! Tracking goes through enrichment into the ingestion buffer; every read
//! goes through the cached query layer.

pub mod params;
pub mod service;

pub use params::{EventsParams, QueryParams};
pub use service::{AnalyticsService, BatchReceipt, ServiceStatus};
