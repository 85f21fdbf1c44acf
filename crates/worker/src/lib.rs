//! Enrichment and background work for the analytics engine.
//!
//! - Bot and channel classification
//! - Geolocation (MaxMind database, lookup cache)
//! - Event enrichment
//! - Scheduled tasks: buffer flush, cache sweep, cache stats, cache warming

pub mod bot;
pub mod channel;
pub mod enrichment;
pub mod geo;
pub mod scheduler;
pub mod warmer;

pub use enrichment::Enricher;
pub use geo::{open_geo, GeoConfig, GeoLocation, GeoLookup};
pub use scheduler::*;
pub use warmer::CacheWarmer;
