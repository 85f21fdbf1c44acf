//! Core types, filters, and the storage contract for the analytics engine.

pub mod error;
pub mod events;
pub mod filter;
pub mod funnel;
pub mod limits;
pub mod results;
pub mod store;

pub use error::{Error, Result};
pub use events::*;
pub use filter::*;
pub use funnel::*;
pub use results::*;
pub use store::*;
