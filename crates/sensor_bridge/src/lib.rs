//! # Sensor Bridge
//!
//! Serves each component the reading that would have existed at a simulated
//! timestamp.
//!
//! - [`Interpolator`]: turns bracketing readings into one reading, or reports
//!   the data as unavailable
//! - [`SensorDataBridge`]: copy-on-refresh cache of current readings per
//!   channel, refreshed once per tick before any component runs

mod bridge;
mod cache;
mod interpolator;

pub use bridge::{BridgeStats, BridgeView, SensorDataBridge};
pub use interpolator::{blend_payload, Interpolator};
