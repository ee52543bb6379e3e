//! In-memory checkpoint store with cadence and retention.
//!
//! Component state is reached only through the sandbox's snapshot/restore
//! capability; bridge and scheduler state arrive as plain snapshots and are
//! handed back to the caller on restore.

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{
    BridgeCacheSnapshot, Checkpoint, CheckpointSettings, ComponentId, ComponentSandbox,
    SchedulerSnapshot, SimError, StateBlob, Timestamp,
};
use metrics::{counter, gauge};
use tracing::{debug, info, instrument, warn};

use crate::FileCheckpointStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    pub interval_us: Timestamp,
    pub retention_us: Timestamp,
    pub max_checkpoints: usize,
}

impl From<&CheckpointSettings> for CheckpointPolicy {
    fn from(s: &CheckpointSettings) -> Self {
        Self {
            interval_us: s.interval_us,
            retention_us: s.retention_us,
            max_checkpoints: s.max_checkpoints,
        }
    }
}

#[derive(Debug)]
pub struct StateManager {
    run_id: String,
    policy: CheckpointPolicy,
    checkpoints: BTreeMap<Timestamp, Arc<Checkpoint>>,
    /// First checkpoint of the run; never collected
    anchor: Option<Timestamp>,
    persistence: Option<FileCheckpointStore>,
}

impl StateManager {
    pub fn new(run_id: impl Into<String>, policy: CheckpointPolicy) -> Self {
        Self {
            run_id: run_id.into(),
            policy,
            checkpoints: BTreeMap::new(),
            anchor: None,
            persistence: None,
        }
    }

    pub fn with_persistence(mut self, store: FileCheckpointStore) -> Self {
        self.persistence = Some(store);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.checkpoints.contains_key(&at)
    }

    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.checkpoints.keys().copied().collect()
    }

    /// Due when no checkpoint exists in `(at - interval, at]`.
    ///
    /// Keyed on simulated time, so playback speed does not change density.
    pub fn is_due(&self, at: Timestamp) -> bool {
        let from = at.saturating_sub(self.policy.interval_us).saturating_add(1);
        self.checkpoints.range(from..=at).next().is_none()
    }

    /// Snapshot each component through the sandbox.
    pub async fn capture_components<S: ComponentSandbox>(
        sandbox: &S,
        components: &[ComponentId],
    ) -> Result<BTreeMap<ComponentId, StateBlob>, SimError> {
        let mut states = BTreeMap::new();
        for id in components {
            states.insert(id.clone(), sandbox.snapshot_state(id).await?);
        }
        Ok(states)
    }

    /// Capture and store a checkpoint at `at`.
    ///
    /// Must be called outside an active tick.
    #[instrument(name = "state_checkpoint", skip_all, fields(at = at))]
    pub async fn checkpoint<S: ComponentSandbox>(
        &mut self,
        at: Timestamp,
        sandbox: &S,
        components: &[ComponentId],
        bridge: BridgeCacheSnapshot,
        scheduler: SchedulerSnapshot,
    ) -> Result<Arc<Checkpoint>, SimError> {
        let component_states = Self::capture_components(sandbox, components).await?;
        self.insert(Checkpoint {
            run_id: self.run_id.clone(),
            timestamp_us: at,
            component_states,
            bridge,
            scheduler,
        })
    }

    /// Store a checkpoint, replacing any at the same time, then collect.
    pub fn insert(&mut self, checkpoint: Checkpoint) -> Result<Arc<Checkpoint>, SimError> {
        if let Some(store) = &self.persistence {
            store.save(&checkpoint)?;
        }
        let at = checkpoint.timestamp_us;
        let checkpoint = Arc::new(checkpoint);
        self.checkpoints.insert(at, Arc::clone(&checkpoint));
        if self.anchor.is_none_or(|anchor| at < anchor) {
            self.anchor = Some(at);
        }
        self.collect_garbage();

        counter!("replay_sim_checkpoints_total").increment(1);
        gauge!("replay_sim_checkpoints_retained").set(self.checkpoints.len() as f64);
        debug!(at, retained = self.checkpoints.len(), "checkpoint stored");
        Ok(checkpoint)
    }

    fn collect_garbage(&mut self) {
        let Some(&newest) = self.checkpoints.keys().next_back() else {
            return;
        };
        let horizon = newest.saturating_sub(self.policy.retention_us);
        let anchor = self.anchor;
        let before = self.checkpoints.len();
        self.checkpoints
            .retain(|&ts, _| ts >= horizon || Some(ts) == anchor);

        while self.checkpoints.len() > self.policy.max_checkpoints {
            let oldest = self
                .checkpoints
                .keys()
                .copied()
                .find(|&ts| Some(ts) != anchor);
            match oldest {
                Some(ts) => {
                    self.checkpoints.remove(&ts);
                }
                None => break,
            }
        }

        let dropped = before - self.checkpoints.len();
        if dropped > 0 {
            debug!(dropped, "checkpoints collected");
        }
    }

    /// Checkpoint with the greatest key `<= at`, from memory or disk.
    ///
    /// # Errors
    /// `NoCheckpointAvailable` when none exists, including before the first.
    pub fn latest_at_or_before(&self, at: Timestamp) -> Result<Arc<Checkpoint>, SimError> {
        let in_memory = self.checkpoints.range(..=at).next_back().map(|(_, c)| c);

        if let Some(store) = &self.persistence {
            let on_disk = store
                .list(&self.run_id)?
                .into_iter()
                .filter(|&ts| ts <= at)
                .max();
            match (in_memory, on_disk) {
                (Some(mem), Some(disk)) if disk > mem.timestamp_us => {
                    return Ok(Arc::new(store.load(&self.run_id, disk)?));
                }
                (None, Some(disk)) => return Ok(Arc::new(store.load(&self.run_id, disk)?)),
                _ => {}
            }
        }

        in_memory
            .cloned()
            .ok_or(SimError::NoCheckpointAvailable { at })
    }

    /// Push the nearest checkpoint at or before `at` back into every component.
    ///
    /// All-or-nothing: if any component rejects its state, the states captured
    /// just before are written back and the error is returned. The returned
    /// checkpoint's bridge and scheduler snapshots are for the caller to apply.
    #[instrument(name = "state_restore", skip_all, fields(at = at))]
    pub async fn restore<S: ComponentSandbox>(
        &self,
        at: Timestamp,
        sandbox: &S,
        components: &[ComponentId],
    ) -> Result<Arc<Checkpoint>, SimError> {
        let checkpoint = self.latest_at_or_before(at)?;

        for id in components {
            if !checkpoint.component_states.contains_key(id) {
                return Err(SimError::persistence(format!(
                    "checkpoint at {} has no state for component '{id}'",
                    checkpoint.timestamp_us
                )));
            }
        }

        let rollback = Self::capture_components(sandbox, components).await?;

        for (i, id) in components.iter().enumerate() {
            let blob = checkpoint.component_states[id].clone();
            if let Err(e) = sandbox.restore_state(id, blob).await {
                warn!(component = %id, error = %e, "restore failed, rolling back");
                for done in &components[..i] {
                    if let Err(rb) = sandbox.restore_state(done, rollback[done].clone()).await {
                        warn!(component = %done, error = %rb, "rollback failed");
                    }
                }
                return Err(e);
            }
        }

        counter!("replay_sim_restores_total").increment(1);
        info!(requested = at, restored = checkpoint.timestamp_us, "checkpoint restored");
        Ok(checkpoint)
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
        self.anchor = None;
    }
}
