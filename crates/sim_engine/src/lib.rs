//! # Sim Engine
//!
//! The simulation orchestrator: owns the clock, component graph, sensor
//! bridge and state manager of one run and drives them tick by tick.
//!
//! ## State machine
//!
//! ```text
//! Idle --load--> Loaded --play--> Running <--pause/play--> Paused --> Completed
//!                   \________________ seek ___________________/
//! ```
//!
//! ## Delivery
//! - pull: call [`SimulationEngine::step`] and consume the returned frame
//! - push: [`spawn_driver`] runs the tick loop on a task and streams frames

mod driver;
mod engine;
mod executor;
mod state;

pub use driver::{spawn_driver, DriverConfig, SimulationHandle};
pub use engine::SimulationEngine;
pub use state::{ControlAction, ControlOutcome, EngineState, EngineStatus};
