//! Simulation clock
//!
//! Owned by one orchestrator; every mutation goes through play / pause /
//! seek / set_speed / advance.

use contracts::{SimError, SimulationSettings, Timestamp};
use tracing::{debug, info};

use crate::ComponentTiming;

/// `round(1e6 / f)` microseconds; 0 for "every tick" (f <= 0).
pub fn period_for(frequency_hz: f64) -> Timestamp {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return 0;
    }
    (1_000_000.0 / frequency_hz).round() as Timestamp
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSettings {
    pub base_tick_us: Timestamp,
    pub speed_ceiling: f64,
    pub loop_playback: bool,
}

impl From<&SimulationSettings> for ClockSettings {
    fn from(s: &SimulationSettings) -> Self {
        Self {
            base_tick_us: s.base_tick_us,
            speed_ceiling: s.speed_ceiling,
            loop_playback: s.loop_playback,
        }
    }
}

/// Read-only copy of the clock for status reporting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    pub current_time: Timestamp,
    pub playback_speed: f64,
    pub is_playing: bool,
    pub range_start: Timestamp,
    pub range_end: Timestamp,
}

/// What one advance did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time moved forward to the contained value
    Advanced(Timestamp),
    /// Not playing, or speed 0
    Held(Timestamp),
    /// Next time would pass `range_end`; playback stopped
    EndOfData(Timestamp),
    /// Passed `range_end` with looping on; time wrapped to `range_start`
    Wrapped(Timestamp),
}

impl TickOutcome {
    pub fn time(self) -> Timestamp {
        match self {
            Self::Advanced(t) | Self::Held(t) | Self::EndOfData(t) | Self::Wrapped(t) => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    current_time: Timestamp,
    playback_speed: f64,
    is_playing: bool,
    range_start: Timestamp,
    range_end: Timestamp,
    settings: ClockSettings,
}

impl SimulationClock {
    /// Clock positioned at `range_start`, paused.
    pub fn new(
        range_start: Timestamp,
        range_end: Timestamp,
        initial_speed: f64,
        settings: ClockSettings,
    ) -> Result<Self, SimError> {
        if range_start > range_end {
            return Err(SimError::invalid_argument(
                "range",
                format!("range_start {range_start} > range_end {range_end}"),
            ));
        }
        if settings.base_tick_us <= 0 {
            return Err(SimError::invalid_argument(
                "base_tick_us",
                "base tick must be positive",
            ));
        }
        let mut clock = Self {
            current_time: range_start,
            playback_speed: 1.0,
            is_playing: false,
            range_start,
            range_end,
            settings,
        };
        clock.set_speed(initial_speed)?;
        Ok(clock)
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn range(&self) -> (Timestamp, Timestamp) {
        (self.range_start, self.range_end)
    }

    pub fn base_tick_us(&self) -> Timestamp {
        self.settings.base_tick_us
    }

    pub fn state(&self) -> ClockState {
        ClockState {
            current_time: self.current_time,
            playback_speed: self.playback_speed,
            is_playing: self.is_playing,
            range_start: self.range_start,
            range_end: self.range_end,
        }
    }

    pub fn play(&mut self) {
        if !self.is_playing {
            self.is_playing = true;
            info!(at = self.current_time, speed = self.playback_speed, "clock playing");
        }
    }

    pub fn pause(&mut self) {
        if self.is_playing {
            self.is_playing = false;
            info!(at = self.current_time, "clock paused");
        }
    }

    pub fn check_in_range(&self, target: Timestamp) -> Result<(), SimError> {
        if target < self.range_start || target > self.range_end {
            return Err(SimError::out_of_range(target, self.range_start, self.range_end));
        }
        Ok(())
    }

    /// Jump to `target`, always leaving the clock paused.
    ///
    /// # Errors
    /// `OutOfRange` outside `[range_start, range_end]`; the clock is unchanged.
    pub fn seek(&mut self, target: Timestamp) -> Result<(), SimError> {
        self.check_in_range(target)?;
        self.is_playing = false;
        self.current_time = target;
        debug!(at = target, "clock seek");
        Ok(())
    }

    /// # Errors
    /// `InvalidArgument` for negative, non-finite or above-ceiling speeds; the
    /// previous speed is kept.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), SimError> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(SimError::invalid_argument(
                "speed",
                format!("speed must be >= 0, got {speed}"),
            ));
        }
        if speed > self.settings.speed_ceiling {
            return Err(SimError::invalid_argument(
                "speed",
                format!(
                    "speed {speed} exceeds ceiling {}",
                    self.settings.speed_ceiling
                ),
            ));
        }
        self.playback_speed = speed;
        Ok(())
    }

    /// Simulated time one tick would add at the current speed.
    pub fn tick_delta(&self) -> Timestamp {
        (self.settings.base_tick_us as f64 * self.playback_speed).round() as Timestamp
    }

    /// Advance by one scaled tick if playing.
    pub fn advance_tick(&mut self) -> TickOutcome {
        if !self.is_playing {
            return TickOutcome::Held(self.current_time);
        }
        let delta = self.tick_delta();
        if delta == 0 {
            return TickOutcome::Held(self.current_time);
        }
        self.move_by(delta)
    }

    /// Advance by one unscaled base tick regardless of play state or speed.
    pub fn step_tick(&mut self) -> TickOutcome {
        self.move_by(self.settings.base_tick_us)
    }

    /// Advance by at most one base tick without passing `target`.
    pub fn step_toward(&mut self, target: Timestamp) -> TickOutcome {
        let delta = self.settings.base_tick_us.min(target - self.current_time);
        if delta <= 0 {
            return TickOutcome::Held(self.current_time);
        }
        self.move_by(delta)
    }

    fn move_by(&mut self, delta: Timestamp) -> TickOutcome {
        let next = self.current_time.saturating_add(delta);
        if next <= self.range_end {
            self.current_time = next;
            return TickOutcome::Advanced(next);
        }
        if self.settings.loop_playback {
            self.current_time = self.range_start;
            debug!(at = self.range_start, "clock wrapped");
            return TickOutcome::Wrapped(self.range_start);
        }
        self.is_playing = false;
        info!(at = self.current_time, "end of data");
        TickOutcome::EndOfData(self.current_time)
    }

    /// `current_time - last_execution >= period`; frequency 0 is always due.
    pub fn should_execute(&self, timing: &ComponentTiming) -> bool {
        timing.is_due(self.current_time)
    }
}
