//! Push delivery: the tick loop on its own task
//!
//! The driver task exclusively owns the engine. Control commands arrive over
//! an mpsc channel with oneshot replies and are applied between ticks, so a
//! pause or seek never interrupts a running batch.

use std::time::Duration;

use contracts::{ComponentSandbox, SensorStore, SimError, SimulationFrame, Timestamp};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::engine::SimulationEngine;
use crate::state::{ControlAction, ControlOutcome, EngineState, EngineStatus};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub frame_capacity: usize,
    pub command_capacity: usize,
    /// Pace one tick per `base_tick` of wall time; otherwise run flat out
    pub realtime: bool,
    /// Stop the task once the run completes, closing the frame channel
    pub exit_on_complete: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            frame_capacity: 64,
            command_capacity: 16,
            realtime: true,
            exit_on_complete: false,
        }
    }
}

enum Command {
    Control {
        action: ControlAction,
        reply: oneshot::Sender<Result<ControlOutcome, SimError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

/// Cloneable control handle to a running driver
#[derive(Clone)]
pub struct SimulationHandle {
    commands: mpsc::Sender<Command>,
}

fn driver_stopped() -> SimError {
    SimError::invalid_state("control", "driver stopped")
}

impl SimulationHandle {
    pub async fn control(&self, action: ControlAction) -> Result<ControlOutcome, SimError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Control { action, reply })
            .await
            .map_err(|_| driver_stopped())?;
        rx.await.map_err(|_| driver_stopped())?
    }

    pub async fn play(&self) -> Result<ControlOutcome, SimError> {
        self.control(ControlAction::Play).await
    }

    pub async fn pause(&self) -> Result<ControlOutcome, SimError> {
        self.control(ControlAction::Pause).await
    }

    pub async fn seek(&self, target: Timestamp) -> Result<ControlOutcome, SimError> {
        self.control(ControlAction::Seek { target }).await
    }

    pub async fn set_speed(&self, speed: f64) -> Result<ControlOutcome, SimError> {
        self.control(ControlAction::SetSpeed { speed }).await
    }

    pub async fn step(&self) -> Result<ControlOutcome, SimError> {
        self.control(ControlAction::Step).await
    }

    pub async fn status(&self) -> Result<EngineStatus, SimError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Status { reply })
            .await
            .map_err(|_| driver_stopped())?;
        rx.await.map_err(|_| driver_stopped())
    }

    /// Stop the loop at the next tick boundary. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

/// Run `engine` on a new task.
///
/// Returns the control handle, the frame stream and the task, which yields
/// the engine back once the loop stops.
pub fn spawn_driver<St, Sb>(
    engine: SimulationEngine<St, Sb>,
    config: DriverConfig,
) -> (
    SimulationHandle,
    mpsc::Receiver<SimulationFrame>,
    JoinHandle<SimulationEngine<St, Sb>>,
)
where
    St: SensorStore + 'static,
    Sb: ComponentSandbox,
{
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
    let (frame_tx, frame_rx) = mpsc::channel(config.frame_capacity.max(1));
    let task = tokio::spawn(drive(engine, command_rx, frame_tx, config));
    (
        SimulationHandle {
            commands: command_tx,
        },
        frame_rx,
        task,
    )
}

/// Wall-clock pacing of ticks.
///
/// One tick per `base_tick` of wall time; the clock scales each tick's
/// simulated advance by the playback speed.
struct Pacing {
    realtime: bool,
    held: bool,
    interval: Interval,
}

impl Pacing {
    fn new<St, Sb>(engine: &SimulationEngine<St, Sb>, realtime: bool) -> Self
    where
        St: SensorStore + 'static,
        Sb: ComponentSandbox,
    {
        let base = engine.base_tick_us().unwrap_or(1).max(1) as u64;
        let mut interval = tokio::time::interval(Duration::from_micros(base));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            realtime,
            held: Self::is_held(engine),
            interval,
        }
    }

    fn is_held<St, Sb>(engine: &SimulationEngine<St, Sb>) -> bool
    where
        St: SensorStore + 'static,
        Sb: ComponentSandbox,
    {
        engine.speed().is_some_and(|speed| speed <= 0.0)
    }

    /// Follow speed changes.
    fn retune<St, Sb>(&mut self, engine: &SimulationEngine<St, Sb>)
    where
        St: SensorStore + 'static,
        Sb: ComponentSandbox,
    {
        let held = Self::is_held(engine);
        if held != self.held {
            debug!(held, "time hold changed");
            self.held = held;
        }
    }

    async fn wait(&mut self) {
        // Held time still waits a base tick so the loop does not spin.
        if self.realtime || self.held {
            self.interval.tick().await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[instrument(name = "engine_driver", skip_all)]
async fn drive<St, Sb>(
    mut engine: SimulationEngine<St, Sb>,
    mut commands: mpsc::Receiver<Command>,
    frames: mpsc::Sender<SimulationFrame>,
    config: DriverConfig,
) -> SimulationEngine<St, Sb>
where
    St: SensorStore + 'static,
    Sb: ComponentSandbox,
{
    let mut pacing = Pacing::new(&engine, config.realtime);
    info!(realtime = config.realtime, "driver started");

    loop {
        if config.exit_on_complete && engine.state() == EngineState::Completed {
            break;
        }
        let running = engine.state() == EngineState::Running;

        tokio::select! {
            biased;

            command = commands.recv() => {
                match command {
                    None | Some(Command::Shutdown) => break,
                    Some(Command::Status { reply }) => {
                        let _ = reply.send(engine.status());
                    }
                    Some(Command::Control { action, reply }) => {
                        debug!(?action, "control command");
                        let result = engine.control(action).await;
                        let _ = reply.send(result);
                        pacing.retune(&engine);
                    }
                }
            }

            _ = pacing.wait(), if running => {
                match engine.step().await {
                    Ok(Some(frame)) => {
                        if frames.send(frame).await.is_err() {
                            debug!("frame receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "tick failed, pausing");
                        let _ = engine.pause();
                    }
                }
            }
        }
    }

    info!(state = %engine.state(), "driver stopped");
    engine
}
