//! Moves buffered events into the durable store.

use crate::buffer::EventBuffer;
use engine_core::{ColumnarStore, Result};
use std::sync::Arc;
use telemetry::{health, metrics};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// What a flush attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The batch of this size is now durable.
    Flushed(usize),
    /// Nothing was buffered.
    Empty,
    /// Another flush held the lock; this trigger was coalesced into it.
    Busy,
}

/// Serialises flushes from the buffer to a [`ColumnarStore`].
pub struct Flusher {
    buffer: Arc<EventBuffer>,
    store: Arc<dyn ColumnarStore>,
    flush_lock: Mutex<()>,
}

impl Flusher {
    pub fn new(buffer: Arc<EventBuffer>, store: Arc<dyn ColumnarStore>) -> Self {
        Self {
            buffer,
            store,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    /// Flush unless one is already running.
    pub async fn flush(&self) -> Result<FlushOutcome> {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            debug!("Flush already in progress, skipping trigger");
            return Ok(FlushOutcome::Busy);
        };
        self.flush_locked().await
    }

    /// Wait for any in-flight flush, then flush whatever is left.
    pub async fn drain(&self) -> Result<FlushOutcome> {
        let _guard = self.flush_lock.lock().await;
        self.flush_locked().await
    }

    /// Refuse further writes and drain the buffer.
    pub async fn close(&self) -> Result<FlushOutcome> {
        self.buffer.close();
        let outcome = self.drain().await?;
        info!(
            remaining = self.buffer.len(),
            outcome = ?outcome,
            "Flusher closed"
        );
        Ok(outcome)
    }

    async fn flush_locked(&self) -> Result<FlushOutcome> {
        let batch = self.buffer.take();
        if batch.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let count = batch.len();
        let start = std::time::Instant::now();

        match self.store.append_batch(&batch).await {
            Ok(_) => {
                let elapsed = start.elapsed();
                metrics().flushes.inc();
                metrics().events_flushed.inc_by(count as u64);
                metrics().flush_latency_ms.observe(elapsed.as_millis() as u64);
                health().storage.set_healthy();

                debug!(
                    backend = self.store.backend_name(),
                    count = count,
                    latency_ms = %elapsed.as_millis(),
                    "Flushed events to store"
                );
                Ok(FlushOutcome::Flushed(count))
            }
            Err(e) => {
                metrics().flush_errors.inc();
                health().storage.set_unhealthy(e.to_string());
                error!("Flush of {} events failed, restoring to buffer: {}", count, e);
                self.buffer.restore(batch);
                Err(e)
            }
        }
    }
}
