//! LogSink - frame summary via tracing

use contracts::{FrameHealth, FrameSink, SimError, SimulationFrame};
use tracing::{info, instrument, warn};

pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_frame(&self, frame: &SimulationFrame) {
        let m = &frame.metrics;
        match frame.health {
            FrameHealth::Nominal => info!(
                sink = %self.name,
                at = frame.timestamp_us,
                tick = m.tick,
                executed = m.executed,
                failed = m.failed,
                wall_us = m.wall_duration_us,
                "frame"
            ),
            health => warn!(
                sink = %self.name,
                at = frame.timestamp_us,
                tick = m.tick,
                ?health,
                failed = m.failed,
                skipped = m.skipped,
                alerts = ?frame.alerts,
                "frame not nominal"
            ),
        }
    }
}

impl FrameSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, at = frame.timestamp_us)
    )]
    async fn write(&mut self, frame: &SimulationFrame) -> Result<(), SimError> {
        self.log_frame(frame);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SimError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SimError> {
        info!(sink = %self.name, "log sink closed");
        Ok(())
    }
}
