//! FrameSink trait - Dispatcher output interface

use crate::{SimError, SimulationFrame};

/// Frame output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(FrameSink: Send)]
pub trait LocalFrameSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one frame
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, frame: &SimulationFrame) -> Result<(), SimError>;

    async fn flush(&mut self) -> Result<(), SimError>;

    async fn close(&mut self) -> Result<(), SimError>;
}
