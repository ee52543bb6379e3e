//! Frame metrics: Prometheus recording and an in-memory run summary

use std::collections::BTreeMap;
use std::fmt;

use contracts::{FailureKind, FrameHealth, SimulationFrame};
use metrics::{counter, gauge, histogram};

/// Publish one frame. Call once per emitted frame.
pub fn record_frame_metrics(frame: &SimulationFrame) {
    let m = &frame.metrics;

    counter!("replay_sim_frames_total").increment(1);
    gauge!("replay_sim_sim_time_us").set(frame.timestamp_us as f64);
    gauge!("replay_sim_speed").set(frame.speed);
    histogram!("replay_sim_tick_duration_us").record(m.wall_duration_us as f64);
    histogram!("replay_sim_stages_per_tick").record(m.stages as f64);

    counter!("replay_sim_component_runs_total").increment(m.executed as u64);
    if m.skipped > 0 {
        counter!("replay_sim_component_skips_total").increment(m.skipped as u64);
    }

    gauge!("replay_sim_bridge_hit_ratio").set(m.cache_hit_ratio());
    gauge!("replay_sim_bridge_cached_channels").set(m.cached_channels as f64);

    for result in &frame.results {
        histogram!(
            "replay_sim_component_duration_us",
            "component" => result.component_id.to_string()
        )
        .record(result.duration_us as f64);
    }

    if frame.health != FrameHealth::Nominal {
        let health = match frame.health {
            FrameHealth::Halted => "halted",
            _ => "degraded",
        };
        counter!("replay_sim_unhealthy_frames_total", "health" => health).increment(1);
    }
}

/// Aggregates frames of one run for the end-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct FrameMetricsAggregator {
    pub total_frames: u64,
    pub degraded_frames: u64,
    pub halted_frames: u64,
    pub executions: u64,
    pub failures: BTreeMap<FailureKind, u64>,
    pub first_time_us: Option<i64>,
    pub last_time_us: Option<i64>,
    pub tick_stats: RunningStats,
    pub hit_ratio_stats: RunningStats,
    /// Failure count per component
    pub component_failures: BTreeMap<String, u64>,
}

impl FrameMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, frame: &SimulationFrame) {
        self.total_frames += 1;
        match frame.health {
            FrameHealth::Nominal => {}
            FrameHealth::Degraded => self.degraded_frames += 1,
            FrameHealth::Halted => self.halted_frames += 1,
        }
        self.first_time_us.get_or_insert(frame.timestamp_us);
        self.last_time_us = Some(frame.timestamp_us);

        self.tick_stats.push(frame.metrics.wall_duration_us as f64);
        self.hit_ratio_stats.push(frame.metrics.cache_hit_ratio());

        for result in &frame.results {
            match result.failure() {
                None => self.executions += 1,
                Some(failure) => {
                    if failure.kind != FailureKind::Skipped {
                        self.executions += 1;
                    }
                    *self.failures.entry(failure.kind).or_insert(0) += 1;
                    *self
                        .component_failures
                        .entry(result.component_id.to_string())
                        .or_insert(0) += 1;
                }
            }
        }
    }

    pub fn summary(&self) -> RunSummary {
        let total_failures: u64 = self
            .failures
            .iter()
            .filter(|(kind, _)| **kind != FailureKind::Skipped)
            .map(|(_, n)| n)
            .sum();
        RunSummary {
            total_frames: self.total_frames,
            degraded_frames: self.degraded_frames,
            halted_frames: self.halted_frames,
            executions: self.executions,
            failure_rate: if self.executions > 0 {
                total_failures as f64 / self.executions as f64 * 100.0
            } else {
                0.0
            },
            failures: self.failures.clone(),
            sim_span_us: match (self.first_time_us, self.last_time_us) {
                (Some(a), Some(b)) => b - a,
                _ => 0,
            },
            tick_duration_us: StatsSummary::from(&self.tick_stats),
            bridge_hit_ratio: StatsSummary::from(&self.hit_ratio_stats),
            component_failures: self.component_failures.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_frames: u64,
    pub degraded_frames: u64,
    pub halted_frames: u64,
    pub executions: u64,
    /// Percent of executions that failed
    pub failure_rate: f64,
    pub failures: BTreeMap<FailureKind, u64>,
    pub sim_span_us: i64,
    pub tick_duration_us: StatsSummary,
    pub bridge_hit_ratio: StatsSummary,
    pub component_failures: BTreeMap<String, u64>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Frames: {}", self.total_frames)?;
        writeln!(
            f,
            "Degraded: {}, halted: {}",
            self.degraded_frames, self.halted_frames
        )?;
        writeln!(f, "Simulated span: {:.3}s", self.sim_span_us as f64 / 1e6)?;
        writeln!(
            f,
            "Executions: {} (failures {:.2}%)",
            self.executions, self.failure_rate
        )?;
        writeln!(f, "Tick duration (us): {}", self.tick_duration_us)?;
        writeln!(f, "Bridge hit ratio: {}", self.bridge_hit_ratio)?;

        if !self.failures.is_empty() {
            writeln!(f, "Failures by kind:")?;
            for (kind, count) in &self.failures {
                writeln!(f, "  {kind}: {count}")?;
            }
        }
        if !self.component_failures.is_empty() {
            writeln!(f, "Failures by component:")?;
            for (component, count) in &self.component_failures {
                writeln!(f, "  {component}: {count}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean and variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
