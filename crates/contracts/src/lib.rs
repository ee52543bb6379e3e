//! # Contracts
//!
//! Shared interface contracts of the replay simulator: data structures and
//! traits passed between crates. Business crates depend on this crate, never
//! the other way round.
//!
//! ## Time Model
//! - Simulated time is an integer microsecond counter (`Timestamp`)
//! - Readings are non-decreasing in time per channel

mod checkpoint;
mod config;
mod error;
mod frame;
mod ids;
mod reading;
mod sandbox;
mod sink;
mod store;

pub use checkpoint::*;
pub use config::*;
pub use error::*;
pub use frame::*;
pub use ids::{ChannelId, ComponentId};
pub use reading::*;
pub use sandbox::*;
pub use sink::*;
pub use store::*;
