//! # State Manager
//!
//! Checkpoint capture and restore for seek and recovery.
//!
//! - [`StateManager`]: in-memory checkpoints keyed by simulated time, with
//!   interval cadence and retention
//! - [`FileCheckpointStore`]: optional on-disk copy, one versioned record per
//!   `(run_id, timestamp)`

mod manager;
mod persistence;

pub use manager::{CheckpointPolicy, StateManager};
pub use persistence::FileCheckpointStore;
