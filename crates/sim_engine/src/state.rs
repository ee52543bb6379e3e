//! Engine state and control surface types

use std::fmt;

use contracts::{SimulationFrame, Timestamp};
use sensor_bridge::BridgeStats;
use serde::{Deserialize, Serialize};
use timing::ClockState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Loaded,
    Running,
    Paused,
    Completed,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands accepted by [`crate::SimulationEngine::control`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    Play,
    Pause,
    Seek { target: Timestamp },
    SetSpeed { speed: f64 },
    Step,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlOutcome {
    pub state: EngineState,
    pub current_time: Option<Timestamp>,
    pub speed: Option<f64>,
    /// Frame produced by `Step`
    pub frame: Option<SimulationFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub state: EngineState,
    pub clock: Option<ClockState>,
    pub bridge: Option<BridgeStats>,
    pub checkpoints: usize,
    pub tick: u64,
}
