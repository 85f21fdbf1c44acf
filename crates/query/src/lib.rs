//! Aggregation queries, funnels and the result cache.

pub mod aggregate;
pub mod cache;
pub mod cached;
pub mod engine;
pub mod funnel;
pub mod timeline;

pub use cache::{generate_key, CacheConfig, CacheStats, ResultCache};
pub use cached::CachedQueries;
pub use engine::QueryEngine;
