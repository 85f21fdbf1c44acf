//! Internal metrics collection.
//!
//! Plain atomics, read through `snapshot()` for logging and health output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Monotonic event count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last observed level, e.g. buffered events or cached bytes.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Millisecond latencies in fixed buckets. The last bucket is open-ended.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; 12],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    const BOUNDS_MS: [u64; 11] = [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 5000];

    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BOUNDS_MS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// Upper bound of the bucket holding quantile `q`. Values past the last
    /// bound report that bound.
    pub fn quantile(&self, q: f64) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        let rank = ((count as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;

        let mut seen = 0;
        for (i, bucket) in self.buckets.iter().enumerate() {
            seen += bucket.load(Ordering::Relaxed);
            if seen >= rank {
                return Self::BOUNDS_MS[i.min(Self::BOUNDS_MS.len() - 1)];
            }
        }
        Self::BOUNDS_MS[Self::BOUNDS_MS.len() - 1]
    }
}

/// Collected metrics for the analytics engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion metrics
    pub events_received: Counter,
    pub events_enriched: Counter,
    pub events_rejected: Counter,
    pub bot_events: Counter,
    pub batches_received: Counter,
    pub geo_lookup_failures: Counter,

    // Buffer / flush metrics
    pub flushes: Counter,
    pub flush_errors: Counter,
    pub events_flushed: Counter,
    pub backpressure_rejections: Counter,

    // Query metrics
    pub queries: Counter,
    pub query_errors: Counter,

    // Cache metrics
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub cache_evictions: Counter,
    pub cache_expirations: Counter,
    pub warm_queries: Counter,
    pub warm_errors: Counter,

    // Latency histograms
    pub enrich_latency_ms: Histogram,
    pub flush_latency_ms: Histogram,
    pub query_latency_ms: Histogram,

    // Gauges
    pub buffer_depth: Gauge,
    pub cache_bytes: Gauge,
    pub cache_items: Gauge,
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_received: u64,
    pub events_enriched: u64,
    pub events_rejected: u64,
    pub bot_events: u64,
    pub batches_received: u64,
    pub geo_lookup_failures: u64,
    pub flushes: u64,
    pub flush_errors: u64,
    pub events_flushed: u64,
    pub backpressure_rejections: u64,
    pub queries: u64,
    pub query_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub cache_expirations: u64,
    pub warm_queries: u64,
    pub warm_errors: u64,
    pub enrich_latency_mean_ms: f64,
    pub flush_latency_mean_ms: f64,
    pub flush_latency_p95_ms: u64,
    pub query_latency_mean_ms: f64,
    pub query_latency_p95_ms: u64,
    pub buffer_depth: u64,
    pub cache_bytes: u64,
    pub cache_items: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_received: self.events_received.get(),
            events_enriched: self.events_enriched.get(),
            events_rejected: self.events_rejected.get(),
            bot_events: self.bot_events.get(),
            batches_received: self.batches_received.get(),
            geo_lookup_failures: self.geo_lookup_failures.get(),
            flushes: self.flushes.get(),
            flush_errors: self.flush_errors.get(),
            events_flushed: self.events_flushed.get(),
            backpressure_rejections: self.backpressure_rejections.get(),
            queries: self.queries.get(),
            query_errors: self.query_errors.get(),
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            cache_evictions: self.cache_evictions.get(),
            cache_expirations: self.cache_expirations.get(),
            warm_queries: self.warm_queries.get(),
            warm_errors: self.warm_errors.get(),
            enrich_latency_mean_ms: self.enrich_latency_ms.mean(),
            flush_latency_mean_ms: self.flush_latency_ms.mean(),
            flush_latency_p95_ms: self.flush_latency_ms.quantile(0.95),
            query_latency_mean_ms: self.query_latency_ms.mean(),
            query_latency_p95_ms: self.query_latency_ms.quantile(0.95),
            buffer_depth: self.buffer_depth.get(),
            cache_bytes: self.cache_bytes.get(),
            cache_items: self.cache_items.get(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::default);

/// Process-wide metrics.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_mean_and_quantile() {
        let h = Histogram::default();
        for ms in [1, 3, 4, 8, 40, 40, 40, 90, 300, 20_000] {
            h.observe(ms);
        }

        assert_eq!(h.count(), 10);
        assert!((h.mean() - 2052.6).abs() < 1e-9);
        assert_eq!(h.quantile(0.5), 50);
        assert_eq!(h.quantile(0.8), 100);
        // Overflow reports the last bound.
        assert_eq!(h.quantile(1.0), 5000);
    }

    #[test]
    fn test_empty_histogram() {
        let h = Histogram::default();
        assert_eq!(h.mean(), 0.0);
        assert_eq!(h.quantile(0.95), 0);
    }
}
