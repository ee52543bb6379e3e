//! Simulation orchestrator

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use component_graph::{ComponentGraph, NodeIndex};
use contracts::{
    Checkpoint, ComponentExecutionResult, ComponentFailure, ComponentId, ComponentOutput,
    ComponentSandbox, ExecutionOutcome, FailureKind, FailurePolicy, FrameHealth, FrameMetrics,
    Input, PipelineConfig, SchedulerSnapshot, SeekMode, SensorStore, SimError, SimulationFrame,
    Timestamp,
};
use sensor_bridge::SensorDataBridge;
use state_manager::{CheckpointPolicy, FileCheckpointStore, StateManager};
use timing::{ClockSettings, ComponentTiming, SimulationClock, TickOutcome};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::executor::{self, Job};
use crate::state::{ControlAction, ControlOutcome, EngineState, EngineStatus};

/// Everything owned by one loaded run
struct Run<St> {
    config: PipelineConfig,
    graph: ComponentGraph,
    /// Declaration order, matching node indices
    component_ids: Vec<ComponentId>,
    clock: SimulationClock,
    bridge: Arc<SensorDataBridge<St>>,
    checkpoints: StateManager,
    timings: Vec<ComponentTiming>,
    last_outputs: Vec<Option<ComponentOutput>>,
    tick: u64,
}

/// Drives one simulation run.
///
/// Not shared: every operation takes `&mut self`, so a seek or pause can only
/// happen between ticks.
pub struct SimulationEngine<St, Sb> {
    store: Arc<St>,
    sandbox: Arc<Sb>,
    state: EngineState,
    run: Option<Run<St>>,
}

impl<St, Sb> SimulationEngine<St, Sb>
where
    St: SensorStore + 'static,
    Sb: ComponentSandbox,
{
    pub fn new(store: Arc<St>, sandbox: Arc<Sb>) -> Self {
        Self {
            store,
            sandbox,
            state: EngineState::Idle,
            run: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_time(&self) -> Option<Timestamp> {
        self.run.as_ref().map(|r| r.clock.current_time())
    }

    pub fn speed(&self) -> Option<f64> {
        self.run.as_ref().map(|r| r.clock.playback_speed())
    }

    pub fn range(&self) -> Option<(Timestamp, Timestamp)> {
        self.run.as_ref().map(|r| r.clock.range())
    }

    pub fn base_tick_us(&self) -> Option<Timestamp> {
        self.run.as_ref().map(|r| r.clock.base_tick_us())
    }

    pub fn config(&self) -> Option<&PipelineConfig> {
        self.run.as_ref().map(|r| &r.config)
    }

    pub fn graph(&self) -> Option<&ComponentGraph> {
        self.run.as_ref().map(|r| &r.graph)
    }

    pub fn sandbox(&self) -> &Arc<Sb> {
        &self.sandbox
    }

    pub fn checkpoint_times(&self) -> Vec<Timestamp> {
        self.run
            .as_ref()
            .map(|r| r.checkpoints.timestamps())
            .unwrap_or_default()
    }

    pub fn status(&self) -> EngineStatus {
        match &self.run {
            Some(run) => EngineStatus {
                state: self.state,
                clock: Some(run.clock.state()),
                bridge: Some(run.bridge.stats()),
                checkpoints: run.checkpoints.len(),
                tick: run.tick,
            },
            None => EngineStatus {
                state: self.state,
                clock: None,
                bridge: None,
                checkpoints: 0,
                tick: 0,
            },
        }
    }

    /// `Idle -> Loaded`.
    ///
    /// Validates the config, builds the graph, primes the bridge at the start
    /// of the range and takes the initial checkpoint there. Any failure
    /// leaves the engine `Idle`.
    #[instrument(name = "engine_load", skip_all, fields(run_id = %config.simulation.run_id))]
    pub async fn load(&mut self, config: PipelineConfig) -> Result<(), SimError> {
        if self.state != EngineState::Idle {
            return Err(SimError::invalid_state("load", self.state.as_str()));
        }

        config_loader::validate(&config)?;
        let graph = ComponentGraph::build(&config.components)?;
        let (range_start, range_end) = self.resolve_range(&config).await?;

        let clock = SimulationClock::new(
            range_start,
            range_end,
            config.simulation.initial_speed,
            ClockSettings::from(&config.simulation),
        )?;

        let bridge = Arc::new(SensorDataBridge::from_config(Arc::clone(&self.store), &config));
        bridge.refresh(range_start).await?;

        let mut checkpoints = StateManager::new(
            config.simulation.run_id.clone(),
            CheckpointPolicy::from(&config.checkpoint),
        );
        if let Some(dir) = &config.checkpoint.persist_dir {
            checkpoints = checkpoints.with_persistence(FileCheckpointStore::new(dir)?);
        }

        let component_ids: Vec<ComponentId> = graph.nodes().iter().map(|n| n.id().clone()).collect();
        let timings = graph
            .nodes()
            .iter()
            .map(|n| ComponentTiming::new(n.descriptor.frequency_hz))
            .collect();
        let last_outputs = vec![None; graph.len()];

        let mut run = Run {
            config,
            graph,
            component_ids,
            clock,
            bridge,
            checkpoints,
            timings,
            last_outputs,
            tick: 0,
        };
        run.checkpoint_at(range_start, self.sandbox.as_ref()).await?;

        info!(
            components = run.graph.len(),
            stages = run.graph.stages().len(),
            range_start,
            range_end,
            "simulation loaded"
        );
        self.run = Some(run);
        self.state = EngineState::Loaded;
        Ok(())
    }

    async fn resolve_range(&self, config: &PipelineConfig) -> Result<(Timestamp, Timestamp), SimError> {
        let bounds = self.store.bounds().await?;
        let sim = &config.simulation;
        let start = sim.range_start_us.or(bounds.map(|(s, _)| s));
        let end = sim.range_end_us.or(bounds.map(|(_, e)| e));
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(SimError::store(
                "sensor store is empty and no playback range is configured",
            )),
        }
    }

    /// `Loaded | Paused -> Running`; no-op when already running.
    pub fn play(&mut self) -> Result<(), SimError> {
        let state = self.state;
        let Some(run) = self.run.as_mut() else {
            return Err(SimError::invalid_state("play", state.as_str()));
        };
        match state {
            EngineState::Running => Ok(()),
            EngineState::Loaded | EngineState::Paused => {
                run.clock.play();
                self.state = EngineState::Running;
                Ok(())
            }
            EngineState::Idle | EngineState::Completed => {
                Err(SimError::invalid_state("play", state.as_str()))
            }
        }
    }

    /// Alias of [`Self::play`].
    pub fn start(&mut self) -> Result<(), SimError> {
        self.play()
    }

    /// `Running -> Paused`; takes effect at the next tick boundary.
    pub fn pause(&mut self) -> Result<(), SimError> {
        let state = self.state;
        let Some(run) = self.run.as_mut() else {
            return Err(SimError::invalid_state("pause", state.as_str()));
        };
        match state {
            EngineState::Running => {
                run.clock.pause();
                self.state = EngineState::Paused;
                Ok(())
            }
            EngineState::Loaded | EngineState::Paused => Ok(()),
            EngineState::Idle | EngineState::Completed => {
                Err(SimError::invalid_state("pause", state.as_str()))
            }
        }
    }

    /// # Errors
    /// `InvalidArgument` for a negative or above-ceiling speed; nothing changes.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), SimError> {
        let state = self.state;
        let Some(run) = self.run.as_mut() else {
            return Err(SimError::invalid_state("set_speed", state.as_str()));
        };
        run.clock.set_speed(speed)?;
        debug!(speed, "playback speed set");
        Ok(())
    }

    /// One tick.
    ///
    /// While running the clock advances by the speed-scaled tick; otherwise by
    /// exactly one base tick (manual stepping). Returns `None` when time is
    /// held (speed 0) or the run completed.
    #[instrument(name = "engine_step", skip(self))]
    pub async fn step(&mut self) -> Result<Option<SimulationFrame>, SimError> {
        let state = self.state;
        let sandbox = Arc::clone(&self.sandbox);
        let Some(run) = self.run.as_mut() else {
            return Err(SimError::invalid_state("step", state.as_str()));
        };
        if state == EngineState::Completed {
            return Ok(None);
        }

        let mut outcome = run.advance(state);
        if let TickOutcome::Wrapped(start) = outcome {
            info!(at = start, "looping playback to range start");
            run.restore_from(start, sandbox.as_ref()).await?;
            if state == EngineState::Running {
                run.clock.play();
            }
            outcome = run.advance(state);
        }

        let at = match outcome {
            TickOutcome::Advanced(at) => at,
            TickOutcome::Held(_) | TickOutcome::Wrapped(_) => return Ok(None),
            TickOutcome::EndOfData(at) => {
                info!(at, ticks = run.tick, "simulation completed");
                self.state = EngineState::Completed;
                return Ok(None);
            }
        };

        let frame = run.execute_at(at, &sandbox).await?;
        let (_, range_end) = run.clock.range();

        if at == range_end && !run.config.simulation.loop_playback {
            run.clock.pause();
            info!(at, ticks = run.tick, "simulation completed");
            self.state = EngineState::Completed;
        } else if frame.health == FrameHealth::Halted {
            run.clock.pause();
            error!(at, "halting on escalated component failures");
            self.state = EngineState::Paused;
        } else if state == EngineState::Loaded {
            self.state = EngineState::Paused;
        }
        Ok(Some(frame))
    }

    /// Move simulated time to `target`, landing `Paused`.
    ///
    /// Restores the nearest checkpoint at or before `target`; in replay mode
    /// the remaining delta is re-executed in base ticks without emitting
    /// frames, so the run lands exactly on `target`.
    ///
    /// # Errors
    /// `OutOfRange` and `NoCheckpointAvailable` leave the engine unchanged.
    #[instrument(name = "engine_seek", skip(self), fields(target = target))]
    pub async fn seek(&mut self, target: Timestamp) -> Result<Timestamp, SimError> {
        let state = self.state;
        let sandbox = Arc::clone(&self.sandbox);
        let Some(run) = self.run.as_mut() else {
            return Err(SimError::invalid_state("seek", state.as_str()));
        };
        run.clock.check_in_range(target)?;

        let now = run.clock.current_time();
        // Nothing may change unless a restore point exists. A forward seek
        // can restore the pre-seek checkpoint itself.
        let self_anchored = run.config.checkpoint.before_seek && now <= target;
        if !self_anchored {
            run.checkpoints.latest_at_or_before(target)?;
        }
        if run.config.checkpoint.before_seek && !run.checkpoints.contains(now) {
            run.checkpoint_at(now, sandbox.as_ref()).await?;
        }

        let restored = run.restore_from(target, sandbox.as_ref()).await?;
        let landed = match run.config.simulation.seek_mode {
            SeekMode::SnapToCheckpoint => restored,
            SeekMode::Replay => {
                let mut replayed = 0u64;
                while let TickOutcome::Advanced(at) = run.clock.step_toward(target) {
                    run.execute_at(at, &sandbox).await?;
                    replayed += 1;
                }
                debug!(from = restored, replayed, "replayed to seek target");
                run.clock.current_time()
            }
        };
        run.clock.pause();

        info!(from = now, to = landed, "seek complete");
        self.state = EngineState::Paused;
        Ok(landed)
    }

    /// Take a checkpoint at the current time on request.
    pub async fn checkpoint(&mut self) -> Result<Timestamp, SimError> {
        let state = self.state;
        let sandbox = Arc::clone(&self.sandbox);
        let Some(run) = self.run.as_mut() else {
            return Err(SimError::invalid_state("checkpoint", state.as_str()));
        };
        let now = run.clock.current_time();
        run.checkpoint_at(now, sandbox.as_ref()).await?;
        Ok(now)
    }

    /// Single entry point for an external control surface.
    pub async fn control(&mut self, action: ControlAction) -> Result<ControlOutcome, SimError> {
        let frame = match action {
            ControlAction::Play => {
                self.play()?;
                None
            }
            ControlAction::Pause => {
                self.pause()?;
                None
            }
            ControlAction::Seek { target } => {
                self.seek(target).await?;
                None
            }
            ControlAction::SetSpeed { speed } => {
                self.set_speed(speed)?;
                None
            }
            ControlAction::Step => self.step().await?,
        };
        Ok(ControlOutcome {
            state: self.state,
            current_time: self.current_time(),
            speed: self.speed(),
            frame,
        })
    }
}

impl<St: SensorStore + 'static> Run<St> {
    fn advance(&mut self, state: EngineState) -> TickOutcome {
        if state == EngineState::Running {
            self.clock.advance_tick()
        } else {
            self.clock.step_tick()
        }
    }

    fn scheduler_snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            tick: self.tick,
            timings: self
                .component_ids
                .iter()
                .zip(&self.timings)
                .map(|(id, t)| (id.clone(), t.snapshot()))
                .collect(),
            last_outputs: self
                .component_ids
                .iter()
                .zip(&self.last_outputs)
                .filter_map(|(id, out)| out.as_ref().map(|o| (id.clone(), o.clone())))
                .collect(),
        }
    }

    fn apply_scheduler(&mut self, snapshot: &SchedulerSnapshot) {
        self.tick = snapshot.tick;
        for (i, id) in self.component_ids.iter().enumerate() {
            match snapshot.timings.get(id) {
                Some(t) => self.timings[i].restore(t),
                None => {
                    self.timings[i] = ComponentTiming::new(self.graph.node(i).descriptor.frequency_hz)
                }
            }
            self.last_outputs[i] = snapshot.last_outputs.get(id).cloned();
        }
    }

    async fn checkpoint_at<Sb: ComponentSandbox>(
        &mut self,
        at: Timestamp,
        sandbox: &Sb,
    ) -> Result<Arc<Checkpoint>, SimError> {
        let bridge = self.bridge.snapshot();
        let scheduler = self.scheduler_snapshot();
        self.checkpoints
            .checkpoint(at, sandbox, &self.component_ids, bridge, scheduler)
            .await
    }

    /// Restore the checkpoint at or before `target` into components, bridge,
    /// scheduler and clock. Returns the checkpoint's time.
    async fn restore_from<Sb: ComponentSandbox>(
        &mut self,
        target: Timestamp,
        sandbox: &Sb,
    ) -> Result<Timestamp, SimError> {
        let checkpoint = self
            .checkpoints
            .restore(target, sandbox, &self.component_ids)
            .await?;
        self.bridge.restore(&checkpoint.bridge);
        self.apply_scheduler(&checkpoint.scheduler);
        self.clock.seek(checkpoint.timestamp_us)?;
        Ok(checkpoint.timestamp_us)
    }

    /// Upstream inputs of node `index`.
    ///
    /// Dependencies that ran this tick hand over their fresh output or a
    /// missing sentinel; dependencies not due this tick hand over their
    /// previous output.
    fn job_for(
        &self,
        index: NodeIndex,
        stage: usize,
        slots: &[Option<ComponentExecutionResult>],
    ) -> Job {
        let node = self.graph.node(index);
        let mut upstream = BTreeMap::new();
        for &dep in &node.dependencies {
            let input = match &slots[dep] {
                Some(result) => match &result.outcome {
                    ExecutionOutcome::Completed(out) => Input::Available(out.clone()),
                    ExecutionOutcome::Failed(f) => Input::missing(format!("{}: {}", f.kind, f.message)),
                },
                None => match &self.last_outputs[dep] {
                    Some(out) => Input::Available(out.clone()),
                    None => Input::missing("no output yet"),
                },
            };
            upstream.insert(self.component_ids[dep].clone(), input);
        }

        let desc = &node.descriptor;
        Job {
            component_id: desc.id.clone(),
            method: desc.method.clone(),
            stage,
            channels: desc.inputs.clone(),
            upstream,
            timeout: Duration::from_millis(desc.timeout_ms),
            retry: desc.retry,
        }
    }

    /// Refresh, run every due component stage by stage, assemble the frame,
    /// then checkpoint if due.
    async fn execute_at<Sb: ComponentSandbox>(
        &mut self,
        at: Timestamp,
        sandbox: &Arc<Sb>,
    ) -> Result<SimulationFrame, SimError> {
        let started = Instant::now();
        let before = self.bridge.stats();

        // Refresh is complete before any component of this tick starts.
        self.bridge.refresh(at).await?;
        let view = self.bridge.view();

        let mut slots: Vec<Option<ComponentExecutionResult>> = vec![None; self.graph.len()];
        let mut results = Vec::new();
        let mut tripped: Option<ComponentId> = None;
        let mut stages_run = 0;

        for (stage_index, stage) in self.graph.stages().iter().enumerate() {
            let due: Vec<NodeIndex> = stage
                .nodes
                .iter()
                .copied()
                .filter(|&i| self.timings[i].is_due(at))
                .collect();
            if due.is_empty() {
                continue;
            }

            if let Some(culprit) = &tripped {
                let reason = format!("fail-fast component '{culprit}' failed earlier in this tick");
                for &i in &due {
                    let result = executor::skipped(self.component_ids[i].clone(), stage_index, &reason);
                    slots[i] = Some(result.clone());
                    results.push(result);
                }
                continue;
            }

            stages_run += 1;
            let mut batch = JoinSet::new();
            let mut task_nodes = HashMap::with_capacity(due.len());
            for &i in &due {
                let job = self.job_for(i, stage_index, &slots);
                let handle = batch.spawn(executor::run_component(
                    Arc::clone(sandbox),
                    view.clone(),
                    job,
                    at,
                ));
                task_nodes.insert(handle.id(), i);
            }

            // Join barrier: the whole stage finishes before the next starts.
            while let Some(joined) = batch.join_next_with_id().await {
                match joined {
                    Ok((task, result)) => {
                        if let Some(&i) = task_nodes.get(&task) {
                            slots[i] = Some(result);
                        }
                    }
                    Err(e) => {
                        if let Some(&i) = task_nodes.get(&e.id()) {
                            error!(component = %self.component_ids[i], error = %e, "component task aborted");
                            slots[i] = Some(ComponentExecutionResult {
                                component_id: self.component_ids[i].clone(),
                                stage: stage_index,
                                duration_us: 0,
                                attempts: 1,
                                outcome: ExecutionOutcome::Failed(ComponentFailure::new(
                                    FailureKind::Execution,
                                    format!("component task aborted: {e}"),
                                )),
                            });
                        }
                    }
                }
            }

            for &i in &due {
                let Some(result) = slots[i].clone() else {
                    continue;
                };
                self.timings[i].record(at, result.duration_us, result.is_success());
                self.last_outputs[i] = result.output().cloned();
                if !result.is_success()
                    && self.graph.node(i).descriptor.failure_policy == FailurePolicy::FailFast
                {
                    tripped.get_or_insert_with(|| self.component_ids[i].clone());
                }
                results.push(result);
            }
        }

        let mut health = FrameHealth::Nominal;
        let mut alerts = Vec::new();
        if let Some(culprit) = &tripped {
            health = FrameHealth::Degraded;
            alerts.push(format!(
                "fail-fast component '{culprit}' failed; remaining stages skipped"
            ));
        }

        let sim = &self.config.simulation;
        for result in results.iter().filter(|r| r.attempts > 0 && !r.is_success()) {
            let Some(i) = self.graph.index_of(&result.component_id) else {
                continue;
            };
            let streak = self.timings[i].failure_streak();
            if streak >= sim.failure_escalation_threshold {
                error!(component = %result.component_id, streak, at, "component failures escalated");
                alerts.push(format!(
                    "component '{}' failed {streak} consecutive times",
                    result.component_id
                ));
                health = if sim.halt_on_escalation {
                    FrameHealth::Halted
                } else if health == FrameHealth::Halted {
                    health
                } else {
                    FrameHealth::Degraded
                };
            }
        }

        let after = self.bridge.stats();
        let executed = results.iter().filter(|r| r.attempts > 0).count();
        let failed = results
            .iter()
            .filter(|r| r.attempts > 0 && !r.is_success())
            .count();
        self.tick += 1;

        let metrics = FrameMetrics {
            tick: self.tick,
            executed,
            failed,
            skipped: results.len() - executed,
            stages: stages_run,
            wall_duration_us: started.elapsed().as_micros() as u64,
            bridge_hits: after.hits.saturating_sub(before.hits),
            bridge_misses: after.misses.saturating_sub(before.misses),
            cached_channels: after.cached_channels,
        };
        debug!(at, tick = self.tick, executed, failed, ?health, "tick complete");

        let frame = SimulationFrame {
            timestamp_us: at,
            speed: self.clock.playback_speed(),
            results,
            metrics,
            health,
            alerts,
        };

        if self.checkpoints.is_due(at) {
            if let Err(e) = self.checkpoint_at(at, sandbox.as_ref()).await {
                warn!(at, error = %e, "periodic checkpoint failed");
            }
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OutputValue, SensorPayload, SensorReading};
    use sandbox::NativeSandbox;
    use sensor_store::InMemorySensorStore;

    type Engine = SimulationEngine<InMemorySensorStore, NativeSandbox>;

    /// `speed` every 10ms over [0, 100ms], value = t in ms.
    fn store() -> InMemorySensorStore {
        InMemorySensorStore::from_readings((0..=10).map(|k| {
            SensorReading::new("speed", k * 10_000, SensorPayload::Scalar(k as f64 * 10.0))
        }))
    }

    fn config(components: serde_json::Value) -> PipelineConfig {
        serde_json::from_value(serde_json::json!({
            "simulation": { "base_tick_us": 10_000 },
            "checkpoint": { "interval_us": 30_000, "retention_us": 1_000_000 },
            "components": components,
        }))
        .unwrap()
    }

    async fn loaded(components: serde_json::Value) -> Engine {
        let config = config(components);
        let sandbox = NativeSandbox::from_config(&config).unwrap();
        let mut engine = SimulationEngine::new(Arc::new(store()), Arc::new(sandbox));
        engine.load(config).await.unwrap();
        engine
    }

    fn counter() -> serde_json::Value {
        serde_json::json!([
            { "id": "count", "module": "counter", "failure_policy": "continue" }
        ])
    }

    fn number(frame: &SimulationFrame, id: &str, key: &str) -> f64 {
        frame
            .result(id)
            .and_then(|r| r.output())
            .and_then(|o| o.get(key))
            .and_then(OutputValue::as_number)
            .unwrap()
    }

    #[tokio::test]
    async fn test_load_enters_loaded_with_initial_checkpoint() {
        let engine = loaded(counter()).await;
        assert_eq!(engine.state(), EngineState::Loaded);
        assert_eq!(engine.current_time(), Some(0));
        assert_eq!(engine.range(), Some((0, 100_000)));
        assert_eq!(engine.checkpoint_times(), vec![0]);
    }

    #[tokio::test]
    async fn test_load_twice_rejected() {
        let mut engine = loaded(counter()).await;
        let err = engine.load(config(counter())).await.unwrap_err();
        assert!(matches!(err, SimError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_cyclic_config_stays_idle() {
        let components = serde_json::json!([
            { "id": "a", "module": "counter", "depends_on": ["b"], "failure_policy": "continue" },
            { "id": "b", "module": "counter", "depends_on": ["a"], "failure_policy": "continue" }
        ]);
        let config = config(components);
        let sandbox = NativeSandbox::from_config(&config).unwrap();
        let mut engine = SimulationEngine::new(Arc::new(store()), Arc::new(sandbox));

        let err = engine.load(config).await.unwrap_err();
        assert!(matches!(err, SimError::CyclicDependency { .. }));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_idle_rejects_controls() {
        let mut engine: Engine = SimulationEngine::new(
            Arc::new(store()),
            Arc::new(NativeSandbox::from_config(&config(counter())).unwrap()),
        );
        assert!(engine.play().is_err());
        assert!(engine.step().await.is_err());
        assert!(engine.seek(0).await.is_err());
    }

    #[tokio::test]
    async fn test_step_runs_until_completed() {
        let mut engine = loaded(counter()).await;
        let mut times = Vec::new();
        while let Some(frame) = engine.step().await.unwrap() {
            times.push(frame.timestamp_us);
            let expected = if frame.timestamp_us == 100_000 {
                EngineState::Completed
            } else {
                EngineState::Paused
            };
            assert_eq!(engine.state(), expected);
        }
        assert_eq!(times, (1..=10).map(|k| k * 10_000).collect::<Vec<_>>());
        assert_eq!(engine.state(), EngineState::Completed);
        assert!(engine.step().await.unwrap().is_none());
        assert!(engine.play().is_err());
    }

    #[tokio::test]
    async fn test_play_pause_transitions() {
        let mut engine = loaded(counter()).await;
        engine.play().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        let frame = engine.step().await.unwrap().unwrap();
        assert_eq!(frame.timestamp_us, 10_000);
        engine.pause().unwrap();
        assert_eq!(engine.state(), EngineState::Paused);
        engine.start().unwrap();
        engine.play().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
    }

    #[tokio::test]
    async fn test_periodic_checkpoints_follow_simulated_time() {
        let mut engine = loaded(counter()).await;
        engine.set_speed(2.0).unwrap();
        engine.play().unwrap();
        while engine.step().await.unwrap().is_some() {}
        assert_eq!(engine.checkpoint_times(), vec![0, 40_000, 80_000]);
    }

    #[tokio::test]
    async fn test_seek_snap_mode_lands_on_checkpoint() {
        let mut config = config(counter());
        config.simulation.seek_mode = SeekMode::SnapToCheckpoint;
        let sandbox = NativeSandbox::from_config(&config).unwrap();
        let mut engine = SimulationEngine::new(Arc::new(store()), Arc::new(sandbox));
        engine.load(config).await.unwrap();

        for _ in 0..5 {
            engine.step().await.unwrap();
        }
        let landed = engine.seek(45_000).await.unwrap();
        assert_eq!(landed, 30_000);
        assert_eq!(engine.state(), EngineState::Paused);

        let frame = engine.step().await.unwrap().unwrap();
        assert_eq!(number(&frame, "count", "count"), 4.0);
    }

    #[tokio::test]
    async fn test_seek_replay_mode_lands_on_target() {
        let mut engine = loaded(counter()).await;
        for _ in 0..8 {
            engine.step().await.unwrap();
        }
        let landed = engine.seek(45_000).await.unwrap();
        assert_eq!(landed, 45_000);
        assert_eq!(engine.current_time(), Some(45_000));

        let frame = engine.step().await.unwrap().unwrap();
        assert_eq!(frame.timestamp_us, 55_000);
        // ticks at 10k, 20k, 30k, 40k, 45k, 55k
        assert_eq!(number(&frame, "count", "count"), 6.0);
    }

    #[tokio::test]
    async fn test_seek_out_of_range_keeps_time() {
        let mut engine = loaded(counter()).await;
        engine.step().await.unwrap();
        assert!(matches!(engine.seek(-1).await, Err(SimError::OutOfRange { .. })));
        assert!(matches!(engine.seek(100_001).await, Err(SimError::OutOfRange { .. })));
        assert_eq!(engine.current_time(), Some(10_000));
    }

    #[tokio::test]
    async fn test_seek_without_restore_point_leaves_checkpoints() {
        let mut engine = loaded(counter()).await;
        for _ in 0..5 {
            engine.step().await.unwrap();
        }
        if let Some(run) = engine.run.as_mut() {
            run.checkpoints.clear();
        }

        let err = engine.seek(20_000).await.unwrap_err();
        assert!(matches!(err, SimError::NoCheckpointAvailable { .. }));
        assert!(engine.checkpoint_times().is_empty());
        assert_eq!(engine.current_time(), Some(50_000));
        assert_eq!(engine.state(), EngineState::Paused);
    }

    #[tokio::test]
    async fn test_seek_revives_completed_run() {
        let mut engine = loaded(counter()).await;
        while engine.step().await.unwrap().is_some() {}
        engine.seek(20_000).await.unwrap();
        assert_eq!(engine.state(), EngineState::Paused);
        assert!(engine.step().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_loop_playback_restarts_from_range_start() {
        let mut config = config(counter());
        config.simulation.loop_playback = true;
        config.simulation.range_end_us = Some(25_000);
        let sandbox = NativeSandbox::from_config(&config).unwrap();
        let mut engine = SimulationEngine::new(Arc::new(store()), Arc::new(sandbox));
        engine.load(config).await.unwrap();
        engine.play().unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let frame = engine.step().await.unwrap().unwrap();
            seen.push((frame.timestamp_us, number(&frame, "count", "count")));
        }
        assert_eq!(
            seen,
            vec![(10_000, 1.0), (20_000, 2.0), (10_000, 1.0), (20_000, 2.0)]
        );
        assert_eq!(engine.state(), EngineState::Running);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_later_stages() {
        let mut engine = loaded(serde_json::json!([
            { "id": "gate", "module": "counter", "failure_policy": "fail_fast",
              "params": { "fault.fail": "always" } },
            { "id": "after", "module": "counter", "depends_on": ["gate"], "failure_policy": "continue" }
        ]))
        .await;

        let frame = engine.step().await.unwrap().unwrap();
        assert_eq!(frame.health, FrameHealth::Degraded);
        assert_eq!(
            frame.result("after").and_then(|r| r.failure()).map(|f| f.kind),
            Some(FailureKind::Skipped)
        );
        assert_eq!(frame.metrics.skipped, 1);
        assert_eq!(frame.metrics.failed, 1);
    }

    #[tokio::test]
    async fn test_continue_feeds_missing_input_downstream() {
        let mut engine = loaded(serde_json::json!([
            { "id": "src", "module": "counter", "failure_policy": "continue",
              "params": { "fault.fail": "always" } },
            { "id": "sink", "module": "passthrough", "depends_on": ["src"], "failure_policy": "continue" }
        ]))
        .await;

        let frame = engine.step().await.unwrap().unwrap();
        assert_eq!(frame.health, FrameHealth::Nominal);
        assert!(frame.result("sink").unwrap().is_success());
        assert_eq!(number(&frame, "sink", "missing"), 1.0);
    }

    #[tokio::test]
    async fn test_escalation_halts_when_configured() {
        let mut config = config(serde_json::json!([
            { "id": "bad", "module": "counter", "failure_policy": "continue",
              "params": { "fault.fail": "always" } }
        ]));
        config.simulation.failure_escalation_threshold = 2;
        config.simulation.halt_on_escalation = true;
        let sandbox = NativeSandbox::from_config(&config).unwrap();
        let mut engine = SimulationEngine::new(Arc::new(store()), Arc::new(sandbox));
        engine.load(config).await.unwrap();
        engine.play().unwrap();

        let first = engine.step().await.unwrap().unwrap();
        assert_eq!(first.health, FrameHealth::Nominal);
        let second = engine.step().await.unwrap().unwrap();
        assert_eq!(second.health, FrameHealth::Halted);
        assert_eq!(second.alerts.len(), 1);
        assert_eq!(engine.state(), EngineState::Paused);
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failure() {
        let mut engine = loaded(serde_json::json!([
            { "id": "flaky", "module": "counter", "failure_policy": "continue",
              "retry": { "max_attempts": 2 },
              "params": { "fault.fail": "every:2" } }
        ]))
        .await;

        engine.step().await.unwrap();
        let frame = engine.step().await.unwrap().unwrap();
        let result = frame.result("flaky").unwrap();
        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_control_surface() {
        let mut engine = loaded(counter()).await;
        let out = engine.control(ControlAction::Step).await.unwrap();
        assert!(out.frame.is_some());
        assert_eq!(out.state, EngineState::Paused);

        let err = engine
            .control(ControlAction::SetSpeed { speed: -1.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument { .. }));
        assert_eq!(engine.speed(), Some(1.0));

        let out = engine.control(ControlAction::Play).await.unwrap();
        assert_eq!(out.state, EngineState::Running);
        let status = engine.status();
        assert_eq!(status.tick, 1);
        assert_eq!(status.checkpoints, 1);
    }

    #[tokio::test]
    async fn test_channel_reads_reach_components() {
        let mut engine = loaded(serde_json::json!([
            { "id": "pt", "module": "passthrough", "inputs": ["speed"], "failure_policy": "continue" }
        ]))
        .await;
        engine.seek(15_000).await.unwrap();
        let frame = engine.step().await.unwrap().unwrap();
        assert_eq!(frame.timestamp_us, 25_000);
        assert!((number(&frame, "pt", "speed") - 25.0).abs() < 1e-9);
    }
}
