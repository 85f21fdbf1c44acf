//! Size-bounded TTL cache for query results.
//!
//! Values are stored as JSON; an entry's size is its serialized length.
//! Eviction removes the least recently accessed entries first, using a
//! min-heap of access ticks that is corrected lazily on pop.

use engine_core::{DateRange, QueryFilter, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::{debug, info};

const BYTES_PER_MB: usize = 1024 * 1024;

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory budget in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: usize,
    /// TTL for aggregate query results in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Expired-entry sweep interval in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Stats log interval in seconds
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_max_size_mb() -> usize {
    100
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_stats_interval_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_mb * BYTES_PER_MB
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub items: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
    pub size_mb: f64,
    pub max_size_mb: f64,
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
    size: usize,
    last_access: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// (access tick, key); may hold stale ticks and removed keys.
    lru: BinaryHeap<Reverse<(u64, String)>>,
    size: usize,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.size -= entry.size;
        Some(entry)
    }

    /// Drop heap entries for removed keys once they dominate the heap.
    fn compact_lru(&mut self) {
        if self.lru.len() <= self.entries.len() * 2 + 64 {
            return;
        }
        self.lru = self
            .entries
            .iter()
            .map(|(k, e)| Reverse((e.last_access.load(Ordering::Relaxed), k.clone())))
            .collect();
    }
}

/// Thread-safe result cache.
pub struct ResultCache {
    inner: RwLock<CacheInner>,
    max_size: usize,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            max_size: max_size_bytes,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size_bytes())
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics().cache_hits.inc();
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics().cache_misses.inc();
    }

    /// Live value for `key`, refreshing its recency. Expired entries are
    /// removed on the way out. Hits and misses are left to the caller.
    fn lookup(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Expired: upgrade to a write lock and re-check before deleting.
        let mut inner = self.inner.write();
        if inner.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            inner.remove(key);
            metrics().cache_expirations.inc();
            self.publish_gauges(&inner);
        }
        None
    }

    /// Raw JSON lookup.
    pub fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        let value = self.lookup(key);
        match value {
            Some(_) => self.record_hit(),
            None => self.record_miss(),
        }
        value
    }

    /// Typed lookup. A value that no longer deserializes counts as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(value) = self.lookup(key) else {
            self.record_miss();
            return None;
        };
        match serde_json::from_value(value) {
            Ok(v) => {
                self.record_hit();
                Some(v)
            }
            Err(e) => {
                debug!(key = key, error = %e, "Cached value has unexpected shape");
                self.record_miss();
                None
            }
        }
    }

    /// Insert or replace `key`. Returns whether the value was cached.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<bool> {
        let value = serde_json::to_value(value)?;
        let size = serde_json::to_vec(&value)?.len();

        let mut inner = self.inner.write();
        inner.remove(key);

        if size > self.max_size {
            debug!(key = key, size = size, max = self.max_size, "Value exceeds cache budget");
            self.publish_gauges(&inner);
            return Ok(false);
        }

        let mut evicted = 0u64;
        while inner.size + size > self.max_size {
            let Some(Reverse((tick, victim))) = inner.lru.pop() else {
                break;
            };
            let current = match inner.entries.get(&victim) {
                Some(entry) => entry.last_access.load(Ordering::Relaxed),
                None => continue,
            };
            if current != tick {
                // Accessed since this heap entry was pushed.
                inner.lru.push(Reverse((current, victim)));
                continue;
            }
            inner.remove(&victim);
            evicted += 1;
        }
        if evicted > 0 {
            metrics().cache_evictions.inc_by(evicted);
            debug!(evicted = evicted, "Evicted cache entries");
        }

        let tick = self.next_tick();
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                size,
                last_access: AtomicU64::new(tick),
            },
        );
        inner.lru.push(Reverse((tick, key.to_string())));
        inner.size += size;
        inner.compact_lru();
        self.publish_gauges(&inner);

        Ok(true)
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        inner.compact_lru();
        self.publish_gauges(&inner);
        drop(inner);

        if !expired.is_empty() {
            metrics().cache_expirations.inc_by(expired.len() as u64);
            info!(count = expired.len(), "Cleaned up expired cache entries");
        }
        expired.len()
    }

    /// Drop all entries and reset the hit/miss counters.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = CacheInner::default();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.publish_gauges(&inner);
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.read().size
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        CacheStats {
            items: inner.entries.len(),
            size_bytes: inner.size,
            max_size_bytes: self.max_size,
            size_mb: inner.size as f64 / BYTES_PER_MB as f64,
            max_size_mb: self.max_size as f64 / BYTES_PER_MB as f64,
            hit_rate: if total_requests == 0 {
                0.0
            } else {
                hits as f64 / total_requests as f64 * 100.0
            },
            hits,
            misses,
            total_requests,
        }
    }

    pub fn log_stats(&self) {
        let s = self.stats();
        info!(
            items = s.items,
            size_mb = %format!("{:.2}", s.size_mb),
            max_size_mb = %format!("{:.2}", s.max_size_mb),
            hit_rate = %format!("{:.1}", s.hit_rate),
            hits = s.hits,
            misses = s.misses,
            "Cache stats"
        );
    }

    fn publish_gauges(&self, inner: &CacheInner) {
        metrics().cache_bytes.set(inner.size as u64);
        metrics().cache_items.set(inner.entries.len() as u64);
    }
}

/// Cache key for a query. Times are truncated to the minute so requests a
/// few seconds apart share an entry.
pub fn generate_key(endpoint: &str, range: &DateRange, filter: &QueryFilter, limit: usize) -> String {
    let minute = |secs: i64| secs - secs.rem_euclid(60);
    let data = format!(
        "{}|{}|{}|{}|{}",
        endpoint,
        minute(range.start.timestamp()),
        minute(range.end.timestamp()),
        filter.canonical(),
        limit
    );

    let digest = Sha256::digest(data.as_bytes());
    digest[..16].iter().fold(String::with_capacity(32), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}
