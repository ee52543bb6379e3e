//! # Timing
//!
//! Authoritative simulated time for one run, and per-component timing
//! records used to decide who is due on a tick.

mod clock;
mod component_timing;

pub use clock::{period_for, ClockSettings, ClockState, SimulationClock, TickOutcome};
pub use component_timing::{ComponentTiming, DURATION_WINDOW};
