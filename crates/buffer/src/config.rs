//! Buffer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ingestion buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Buffered event count that raises a flush signal
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Hard ceiling; writes beyond it are rejected
    #[serde(default = "default_max_buffered_events")]
    pub max_buffered_events: usize,
    /// Periodic flush interval in seconds
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

fn default_flush_threshold() -> usize {
    10_000
}

fn default_max_buffered_events() -> usize {
    default_flush_threshold() * 10
}

fn default_flush_interval_secs() -> u64 {
    30
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            max_buffered_events: default_max_buffered_events(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// The ceiling never sits below the threshold, or the signal could never fire.
    pub fn effective_ceiling(&self) -> usize {
        self.max_buffered_events.max(self.flush_threshold)
    }
}
