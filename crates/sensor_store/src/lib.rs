//! # Sensor Store
//!
//! Sensor Store Adapter implementations.
//!
//! - [`InMemorySensorStore`]: sorted per-channel series with binary-search range queries
//! - [`load_recording`]: JSON Lines recording loader

mod memory;
mod recording;

pub use memory::{InMemorySensorStore, StoreSummary};
pub use recording::{load_recording, parse_recording, write_recording};
