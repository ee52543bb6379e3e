//! Checkpoint - State Manager records
//!
//! Everything needed to put a run back at a point in simulated time.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ChannelId, ComponentId, ComponentOutput, InterpolatedReading, Timestamp};

/// Schema tag written with persisted checkpoints
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Opaque component state, meaningful only to the component itself
pub type StateBlob = Bytes;

/// One cached bridge slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSlot {
    pub channel: ChannelId,

    /// Simulated time the slot was resolved for
    pub resolved_at: Timestamp,

    /// `None` when no data was available at refresh time
    pub reading: Option<InterpolatedReading>,
}

/// Bridge current-reading cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeCacheSnapshot {
    pub refreshed_at: Option<Timestamp>,
    pub slots: Vec<CachedSlot>,
}

/// Per-component scheduler bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSnapshot {
    pub last_execution_us: Option<Timestamp>,
    pub run_count: u64,
    pub failure_streak: u32,
    pub recent_durations_us: Vec<u64>,
}

/// Orchestrator state outside components and bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub tick: u64,
    pub timings: BTreeMap<ComponentId, TimingSnapshot>,
    pub last_outputs: BTreeMap<ComponentId, ComponentOutput>,
}

/// A restorable snapshot of all mutable simulation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub timestamp_us: Timestamp,
    pub component_states: BTreeMap<ComponentId, StateBlob>,
    pub bridge: BridgeCacheSnapshot,
    pub scheduler: SchedulerSnapshot,
}
