//! Per-sink counters
//!
//! Kept as atomics so the dispatcher and the sink worker can both update
//! them; mirrored into the `metrics` registry labelled by sink name.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use contracts::Timestamp;

#[derive(Debug)]
pub struct SinkMetrics {
    sink: String,
    queue_len: AtomicUsize,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    /// Simulated time of the last frame written, `i64::MIN` before any
    last_written_us: AtomicI64,
}

impl SinkMetrics {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            queue_len: AtomicUsize::new(0),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_written_us: AtomicI64::new(i64::MIN),
        }
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        metrics::gauge!("replay_sim_sink_queue_len", "sink" => self.sink.clone()).set(len as f64);
    }

    pub fn record_written(&self, at: Timestamp) {
        self.written.fetch_add(1, Ordering::Relaxed);
        self.last_written_us.store(at, Ordering::Relaxed);
        metrics::counter!("replay_sim_sink_frames_total", "sink" => self.sink.clone(), "result" => "written")
            .increment(1);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("replay_sim_sink_frames_total", "sink" => self.sink.clone(), "result" => "failed")
            .increment(1);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("replay_sim_sink_frames_total", "sink" => self.sink.clone(), "result" => "dropped")
            .increment(1);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_written_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            queue_len: self.queue_len.load(Ordering::Relaxed),
            written: self.written(),
            failed: self.failed(),
            dropped: self.dropped(),
            last_written_us: (last != i64::MIN).then_some(last),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
    pub last_written_us: Option<Timestamp>,
}
