//! Shared helpers for the end-to-end tests.
//!
//! Everything runs in-process: an in-memory store stands in for the columnar
//! backend and a static table stands in for the geolocation database.

pub mod fixtures;
pub mod mocks;
pub mod setup;
