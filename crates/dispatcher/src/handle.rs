//! SinkHandle - one sink behind its own bounded queue and worker task

use std::sync::Arc;

use contracts::{FrameSink, SimulationFrame};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::SinkMetrics;

pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Arc<SimulationFrame>>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    pub fn spawn<S: FrameSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new(name.clone()));

        let worker = tokio::spawn(sink_worker(sink, rx, Arc::clone(&metrics), name.clone()));

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a frame without waiting. Returns false if it was dropped.
    pub fn try_send(&self, frame: Arc<SimulationFrame>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.metrics.record_dropped();
                warn!(sink = %self.name, at = frame.timestamp_us, "queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Close the queue, let the worker drain it, then flush and close the sink.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "sink worker panicked");
        }
        debug!(sink = %self.name, "sink handle shut down");
    }
}

#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: FrameSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<SimulationFrame>>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!("sink worker started");

    while let Some(frame) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        match sink.write(&frame).await {
            Ok(()) => metrics.record_written(frame.timestamp_us),
            Err(e) => {
                // One bad write does not stop the sink.
                metrics.record_failed();
                error!(at = frame.timestamp_us, error = %e, "write failed");
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "close failed on shutdown");
    }
    debug!("sink worker stopped");
}
