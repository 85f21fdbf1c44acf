//! Ingestion buffer and flusher.
//!
//! Enriched events accumulate in an [`EventBuffer`]; a [`Flusher`] moves them
//! into the columnar store when the size threshold or the flush timer fires.

pub mod buffer;
pub mod config;
pub mod flusher;

pub use buffer::{EventBuffer, FlushSignal};
pub use config::*;
pub use flusher::{FlushOutcome, Flusher};
