//! # Dispatcher
//!
//! Frame fan-out.
//!
//! - consumes `SimulationFrame`s from the engine
//! - hands each one to every configured sink
//! - a slow sink drops frames on its own queue instead of stalling the run

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{FrameSink, SimulationFrame};
pub use dispatcher::{create_dispatcher, FrameDispatcher};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, LogSink};
