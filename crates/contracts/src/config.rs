//! PipelineConfig - Config Loader output
//!
//! Describes one simulation run: components, channels, timing, interpolation,
//! checkpointing and output routing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use crate::{ChannelId, ComponentId, PayloadKind, Timestamp};

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub simulation: SimulationSettings,

    #[serde(default)]
    pub interpolation: InterpolationSettings,

    #[serde(default)]
    pub checkpoint: CheckpointSettings,

    /// Declaration order is the scheduling tie-break
    pub components: Vec<ComponentDescriptor>,

    /// Declared channels (optional; inputs are checked against these when present)
    #[serde(default)]
    pub channels: Vec<ChannelBinding>,

    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl PipelineConfig {
    /// Every channel referenced by a component input or a binding.
    pub fn referenced_channels(&self) -> Vec<ChannelId> {
        let mut set: BTreeSet<ChannelId> = self
            .components
            .iter()
            .flat_map(|c| c.inputs.iter().cloned())
            .collect();
        set.extend(self.channels.iter().map(|c| c.id.clone()));
        set.into_iter().collect()
    }

    pub fn channel(&self, id: &str) -> Option<&ChannelBinding> {
        self.channels.iter().find(|c| c.id == id)
    }
}

/// Clock and orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Key for persisted checkpoints
    #[serde(default = "default_run_id")]
    pub run_id: String,

    /// Simulated time advanced per tick at speed 1.0
    #[serde(default = "default_base_tick_us")]
    pub base_tick_us: Timestamp,

    #[serde(default = "default_speed_ceiling")]
    pub speed_ceiling: f64,

    #[serde(default = "default_initial_speed")]
    pub initial_speed: f64,

    /// Wrap to range start instead of completing
    #[serde(default)]
    pub loop_playback: bool,

    #[serde(default)]
    pub seek_mode: SeekMode,

    /// Consecutive failures before a component escalates the frame
    #[serde(default = "default_escalation_threshold")]
    pub failure_escalation_threshold: u32,

    /// Pause the run when a component escalates
    #[serde(default)]
    pub halt_on_escalation: bool,

    /// Restrict playback to a sub-range of the recording
    #[serde(default)]
    pub range_start_us: Option<Timestamp>,

    #[serde(default)]
    pub range_end_us: Option<Timestamp>,
}

fn default_run_id() -> String {
    "run".to_string()
}

fn default_base_tick_us() -> Timestamp {
    33_333
}

fn default_speed_ceiling() -> f64 {
    10.0
}

fn default_initial_speed() -> f64 {
    1.0
}

fn default_escalation_threshold() -> u32 {
    3
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            run_id: default_run_id(),
            base_tick_us: default_base_tick_us(),
            speed_ceiling: default_speed_ceiling(),
            initial_speed: default_initial_speed(),
            loop_playback: false,
            seek_mode: SeekMode::default(),
            failure_escalation_threshold: default_escalation_threshold(),
            halt_on_escalation: false,
            range_start_us: None,
            range_end_us: None,
        }
    }
}

/// What `seek` does with the gap between the restored checkpoint and the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekMode {
    /// Re-execute base ticks from the checkpoint up to the exact target
    #[default]
    Replay,
    /// Accept the checkpoint's timestamp as the new current time
    SnapToCheckpoint,
}

/// Bridge and interpolator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationSettings {
    /// A cached reading within ±tolerance of the requested time is served as is
    #[serde(default = "default_tolerance_us")]
    pub tolerance_us: Timestamp,

    /// Largest bracket that is still blended
    #[serde(default = "default_max_gap_us")]
    pub max_gap_us: Timestamp,

    /// How far back a last-known-good reading may come from
    #[serde(default = "default_stale_horizon_us")]
    pub stale_horizon_us: Timestamp,

    /// How far ahead a following reading is looked for
    #[serde(default = "default_lookahead_us")]
    pub lookahead_us: Timestamp,

    /// Readings below this quality are ignored
    #[serde(default)]
    pub min_quality: Option<f32>,
}

fn default_tolerance_us() -> Timestamp {
    16_667
}

fn default_max_gap_us() -> Timestamp {
    200_000
}

fn default_stale_horizon_us() -> Timestamp {
    1_000_000
}

fn default_lookahead_us() -> Timestamp {
    100_000
}

impl Default for InterpolationSettings {
    fn default() -> Self {
        Self {
            tolerance_us: default_tolerance_us(),
            max_gap_us: default_max_gap_us(),
            stale_horizon_us: default_stale_horizon_us(),
            lookahead_us: default_lookahead_us(),
            min_quality: None,
        }
    }
}

/// Checkpoint cadence and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// Simulated time between automatic checkpoints
    #[serde(default = "default_checkpoint_interval_us")]
    pub interval_us: Timestamp,

    /// Checkpoints older than this (relative to the newest) are dropped
    #[serde(default = "default_retention_us")]
    pub retention_us: Timestamp,

    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,

    /// Persist checkpoints under this directory as well as in memory
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,

    /// Capture the current time before every seek
    #[serde(default = "default_before_seek")]
    pub before_seek: bool,
}

fn default_checkpoint_interval_us() -> Timestamp {
    1_000_000
}

fn default_retention_us() -> Timestamp {
    60_000_000
}

fn default_max_checkpoints() -> usize {
    256
}

fn default_before_seek() -> bool {
    true
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            interval_us: default_checkpoint_interval_us(),
            retention_us: default_retention_us(),
            max_checkpoints: default_max_checkpoints(),
            persist_dir: None,
            before_seek: default_before_seek(),
        }
    }
}

/// One processing component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub id: ComponentId,

    /// Sandbox module implementing the component
    pub module: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// 0 = run every tick
    #[serde(default)]
    pub frequency_hz: f64,

    #[serde(default)]
    pub inputs: Vec<ChannelId>,

    /// Components that must complete first in the same tick
    #[serde(default)]
    pub depends_on: Vec<ComponentId>,

    /// Nodes sharing a tag may run concurrently
    #[serde(default)]
    pub parallel_group: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Required: there is no implicit policy
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_method() -> String {
    "process".to_string()
}

fn default_timeout_ms() -> u64 {
    100
}

/// Per-component reaction to its own failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure, feed dependents a missing input
    Continue,
    /// Mark the tick degraded and skip the remaining stages
    FailFast,
}

/// Retry of execution errors (timeouts are never retried)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
        }
    }
}

/// A declared sensor channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBinding {
    pub id: ChannelId,

    /// Expected payload kind, if pinned
    #[serde(default)]
    pub kind: Option<PayloadKind>,

    /// Overrides `interpolation.max_gap_us` for this channel
    #[serde(default)]
    pub max_gap_us: Option<Timestamp>,
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub name: String,

    pub sink_type: SinkType,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    Log,
    /// JSON Lines file
    File,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_is_required() {
        let missing = r#"{"id":"a","module":"passthrough"}"#;
        assert!(serde_json::from_str::<ComponentDescriptor>(missing).is_err());

        let present = r#"{"id":"a","module":"passthrough","failure_policy":"fail_fast"}"#;
        let desc: ComponentDescriptor = serde_json::from_str(present).unwrap();
        assert_eq!(desc.failure_policy, FailurePolicy::FailFast);
        assert_eq!(desc.method, "process");
        assert_eq!(desc.timeout_ms, 100);
        assert_eq!(desc.retry.max_attempts, 1);
        assert_eq!(desc.frequency_hz, 0.0);
    }

    #[test]
    fn test_section_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"components":[]}"#).unwrap();
        assert_eq!(config.simulation.base_tick_us, 33_333);
        assert_eq!(config.simulation.seek_mode, SeekMode::Replay);
        assert_eq!(config.interpolation.tolerance_us, 16_667);
        assert_eq!(config.checkpoint.interval_us, 1_000_000);
        assert!(config.checkpoint.persist_dir.is_none());
    }

    #[test]
    fn test_referenced_channels_dedup_sorted() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{
                "components":[
                    {"id":"a","module":"m","inputs":["speed","imu"],"failure_policy":"continue"},
                    {"id":"b","module":"m","inputs":["imu"],"failure_policy":"continue"}
                ],
                "channels":[{"id":"gps"}]
            }"#,
        )
        .unwrap();
        let channels: Vec<_> = config
            .referenced_channels()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(channels, vec!["gps", "imu", "speed"]);
    }
}
