//! SimulationFrame - Orchestrator output
//!
//! Per-tick bundle of component results and metrics.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ComponentId, Timestamp};

/// One named output value of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Blob(Bytes),
}

impl OutputValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// Named outputs of one invocation
pub type ComponentOutput = BTreeMap<String, OutputValue>;

/// Why a component slot has no output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DataUnavailable,
    Execution,
    Timeout,
    /// Not run because an earlier fail-fast component failed
    Skipped,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataUnavailable => "data_unavailable",
            Self::Execution => "execution",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded in a frame slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ComponentFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed(ComponentOutput),
    Failed(ComponentFailure),
}

/// Result of one due component in one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentExecutionResult {
    pub component_id: ComponentId,

    /// Index of the stage the component ran in
    pub stage: usize,

    pub duration_us: u64,

    pub attempts: u32,

    pub outcome: ExecutionOutcome,
}

impl ComponentExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Completed(_))
    }

    pub fn failure(&self) -> Option<&ComponentFailure> {
        match &self.outcome {
            ExecutionOutcome::Failed(f) => Some(f),
            ExecutionOutcome::Completed(_) => None,
        }
    }

    pub fn output(&self) -> Option<&ComponentOutput> {
        match &self.outcome {
            ExecutionOutcome::Completed(out) => Some(out),
            ExecutionOutcome::Failed(_) => None,
        }
    }
}

/// Frame-level health signal for the control layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameHealth {
    #[default]
    Nominal,
    Degraded,
    /// Escalation with halting enabled; the engine paused itself
    Halted,
}

/// Aggregate metrics snapshot for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub tick: u64,
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stages: usize,
    pub wall_duration_us: u64,
    pub bridge_hits: u64,
    pub bridge_misses: u64,
    pub cached_channels: usize,
}

impl FrameMetrics {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.bridge_hits + self.bridge_misses;
        if total == 0 {
            1.0
        } else {
            self.bridge_hits as f64 / total as f64
        }
    }
}

/// Per-tick output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationFrame {
    pub timestamp_us: Timestamp,

    pub speed: f64,

    /// In execution order
    pub results: Vec<ComponentExecutionResult>,

    pub metrics: FrameMetrics,

    pub health: FrameHealth,

    /// Human-readable reasons for a non-nominal health
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl SimulationFrame {
    pub fn result(&self, id: &str) -> Option<&ComponentExecutionResult> {
        self.results.iter().find(|r| r.component_id == id)
    }

    pub fn executed_ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.component_id.as_str()).collect()
    }
}
