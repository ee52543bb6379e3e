//! Per-component timing record.
//!
//! Mutated only by the orchestrator right after a component completes.

use std::fmt;

use contracts::{Timestamp, TimingSnapshot};
use ringbuf::{traits::*, HeapRb};

use crate::period_for;

/// Durations kept for the rolling average / maximum
pub const DURATION_WINDOW: usize = 32;

pub struct ComponentTiming {
    period_us: Timestamp,
    last_execution_us: Option<Timestamp>,
    durations: HeapRb<u64>,
    run_count: u64,
    failure_streak: u32,
}

impl fmt::Debug for ComponentTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentTiming")
            .field("period_us", &self.period_us)
            .field("last_execution_us", &self.last_execution_us)
            .field("run_count", &self.run_count)
            .field("failure_streak", &self.failure_streak)
            .finish()
    }
}

impl ComponentTiming {
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            period_us: period_for(frequency_hz),
            last_execution_us: None,
            durations: HeapRb::new(DURATION_WINDOW),
            run_count: 0,
            failure_streak: 0,
        }
    }

    pub fn period_us(&self) -> Timestamp {
        self.period_us
    }

    pub fn last_execution_us(&self) -> Option<Timestamp> {
        self.last_execution_us
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    /// Never-run components are always due.
    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.last_execution_us {
            None => true,
            Some(_) if self.period_us == 0 => true,
            Some(last) => now - last >= self.period_us,
        }
    }

    /// Record one completed invocation at simulated time `at`.
    ///
    /// `last_execution` moves in whole periods so that a tick landing just
    /// past a slot boundary does not push later slots out.
    pub fn record(&mut self, at: Timestamp, duration_us: u64, success: bool) {
        self.last_execution_us = Some(match self.last_execution_us {
            Some(last) if self.period_us > 0 && at > last => {
                last + self.period_us * ((at - last) / self.period_us)
            }
            _ => at,
        });
        self.durations.push_overwrite(duration_us);
        self.run_count += 1;
        if success {
            self.failure_streak = 0;
        } else {
            self.failure_streak += 1;
        }
    }

    pub fn average_duration_us(&self) -> f64 {
        let n = self.durations.occupied_len();
        if n == 0 {
            return 0.0;
        }
        self.durations.iter().sum::<u64>() as f64 / n as f64
    }

    pub fn max_duration_us(&self) -> u64 {
        self.durations.iter().copied().max().unwrap_or(0)
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            last_execution_us: self.last_execution_us,
            run_count: self.run_count,
            failure_streak: self.failure_streak,
            recent_durations_us: self.durations.iter().copied().collect(),
        }
    }

    pub fn restore(&mut self, snapshot: &TimingSnapshot) {
        self.last_execution_us = snapshot.last_execution_us;
        self.run_count = snapshot.run_count;
        self.failure_streak = snapshot.failure_streak;
        self.durations.clear();
        for &d in &snapshot.recent_durations_us {
            self.durations.push_overwrite(d);
        }
    }
}
