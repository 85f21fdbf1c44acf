//! In-memory accumulator for enriched events.

use crate::config::BufferConfig;
use engine_core::error::IngestErrorCode;
use engine_core::{Error, Event, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use telemetry::metrics;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receiving half of the coalesced flush signal.
///
/// At most one signal is ever pending; raising it again while one is queued
/// is a no-op.
pub struct FlushSignal {
    rx: mpsc::Receiver<()>,
}

impl FlushSignal {
    /// Wait for the next signal. `None` once the buffer is dropped.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Accumulates events between flushes and assigns their IDs.
pub struct EventBuffer {
    config: BufferConfig,
    events: Mutex<Vec<Event>>,
    next_id: AtomicU64,
    flush_tx: mpsc::Sender<()>,
    closed: AtomicBool,
}

impl EventBuffer {
    /// Creates a buffer whose IDs continue after `last_id`.
    pub fn new(config: BufferConfig, last_id: u64) -> (Self, FlushSignal) {
        let (flush_tx, rx) = mpsc::channel(1);
        let buffer = Self {
            events: Mutex::new(Vec::with_capacity(config.flush_threshold)),
            config,
            next_id: AtomicU64::new(last_id + 1),
            flush_tx,
            closed: AtomicBool::new(false),
        };
        (buffer, FlushSignal { rx })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Append one event, returning its assigned ID.
    pub fn write(&self, event: Event) -> Result<u64> {
        let mut ids = self.write_batch(vec![event])?;
        ids.pop()
            .ok_or_else(|| Error::internal("buffer accepted an event without an ID"))
    }

    /// Append a batch. Either every event is buffered or none is.
    pub fn write_batch(&self, mut batch: Vec<Event>) -> Result<Vec<u64>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let len = {
            let mut events = self.events.lock();
            // Checked under the lock so a write cannot land after close's final take.
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::ingest(
                    IngestErrorCode::BufferFull,
                    "buffer is closed",
                ));
            }
            let ceiling = self.config.effective_ceiling();
            if events.len() + batch.len() > ceiling {
                let buffered = events.len();
                drop(events);
                metrics().backpressure_rejections.inc();
                warn!(
                    buffered = buffered,
                    incoming = batch.len(),
                    ceiling = ceiling,
                    "Buffer full, rejecting write"
                );
                return Err(Error::ingest(
                    IngestErrorCode::BufferFull,
                    format!("buffer holds {} events, ceiling is {}", buffered, ceiling),
                ));
            }

            // IDs are assigned under the lock so buffer order matches ID order.
            let first = self.next_id.fetch_add(batch.len() as u64, Ordering::Relaxed);
            for (offset, event) in batch.iter_mut().enumerate() {
                event.id = first + offset as u64;
            }
            events.extend(batch.iter().cloned());
            events.len()
        };

        metrics().buffer_depth.set(len as u64);
        if len >= self.config.flush_threshold {
            self.signal_flush();
        }

        Ok(batch.into_iter().map(|e| e.id).collect())
    }

    /// Raise the flush signal without blocking.
    pub fn signal_flush(&self) {
        if self.flush_tx.try_send(()).is_ok() {
            debug!("Flush signal raised");
        }
    }

    /// Swap the buffer for an empty one.
    pub fn take(&self) -> Vec<Event> {
        let taken = std::mem::take(&mut *self.events.lock());
        metrics().buffer_depth.set(0);
        taken
    }

    /// Put a failed batch back ahead of anything written since it was taken.
    ///
    /// Restored events bypass the ceiling.
    pub fn restore(&self, mut batch: Vec<Event>) {
        if batch.is_empty() {
            return;
        }
        let len = {
            let mut events = self.events.lock();
            batch.append(&mut events);
            *events = batch;
            events.len()
        };
        metrics().buffer_depth.set(len as u64);
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// The next ID that will be assigned.
    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Stop accepting writes. Buffered events stay until drained.
    pub fn close(&self) {
        let _events = self.events.lock();
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
