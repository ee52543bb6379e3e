//! FrameDispatcher - fan-out of simulation frames to sinks

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{SimulationFrame, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => Ok(SinkHandle::spawn(
            LogSink::new(&config.name),
            config.queue_capacity,
        )),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Consumes frames and hands each one to every sink queue.
///
/// A slow or failing sink only loses its own frames; the producer never waits.
pub struct FrameDispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<SimulationFrame>,
}

impl FrameDispatcher {
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<SimulationFrame>,
    ) -> Self {
        Self { handles, input_rx }
    }

    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Runs until the input channel closes, then drains and closes every sink.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, MetricsSnapshot)> {
        info!(sinks = self.handles.len(), "dispatcher started");

        let mut frame_count: u64 = 0;
        while let Some(frame) = self.input_rx.recv().await {
            frame_count += 1;
            let frame = Arc::new(frame);
            for handle in &self.handles {
                handle.try_send(Arc::clone(&frame));
            }
            if frame_count.is_multiple_of(100) {
                debug!(frames = frame_count, "dispatcher progress");
            }
        }

        info!(frames = frame_count, "dispatcher input closed, shutting down");

        let mut totals = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            let metrics = Arc::clone(handle.metrics());
            handle.shutdown().await;
            totals.push((name, metrics.snapshot()));
        }
        totals
    }

    pub fn spawn(self) -> JoinHandle<Vec<(String, MetricsSnapshot)>> {
        tokio::spawn(self.run())
    }
}

#[instrument(name = "dispatcher_create", skip_all, fields(sinks = sink_configs.len()))]
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<SimulationFrame>,
) -> Result<FrameDispatcher, DispatcherError> {
    let handles = sink_configs
        .iter()
        .map(create_sink_handle)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FrameDispatcher::with_handles(handles, input_rx))
}
