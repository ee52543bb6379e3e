//! ComponentSandbox trait - execution contract with loaded components
//!
//! The engine treats every component as an opaque callable unit exposing
//! invoke / snapshot / restore.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    ChannelId, ComponentId, ComponentOutput, InterpolatedReading, SimError, StateBlob, Timestamp,
};

/// An input slot: either a value or the designated "no data" sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input<T> {
    Available(T),
    Missing { reason: String },
}

impl<T> Input<T> {
    pub fn missing(reason: impl Into<String>) -> Self {
        Self::Missing {
            reason: reason.into(),
        }
    }

    pub fn as_available(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Missing { .. } => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

/// Everything a component sees in one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInputs {
    pub at: Timestamp,
    pub channels: BTreeMap<ChannelId, Input<InterpolatedReading>>,
    pub upstream: BTreeMap<ComponentId, Input<ComponentOutput>>,
}

impl ComponentInputs {
    pub fn new(at: Timestamp) -> Self {
        Self {
            at,
            channels: BTreeMap::new(),
            upstream: BTreeMap::new(),
        }
    }

    pub fn has_missing(&self) -> bool {
        self.channels.values().any(Input::is_missing) || self.upstream.values().any(Input::is_missing)
    }
}

/// Sandbox hosting the run's components.
///
/// Implementations must tolerate concurrent `invoke` calls for distinct
/// components.
#[trait_variant::make(ComponentSandbox: Send)]
pub trait LocalComponentSandbox: Sync + 'static {
    async fn invoke(
        &self,
        component_id: &ComponentId,
        method: &str,
        inputs: ComponentInputs,
        timeout: Duration,
    ) -> Result<ComponentOutput, SimError>;

    async fn snapshot_state(&self, component_id: &ComponentId) -> Result<StateBlob, SimError>;

    async fn restore_state(&self, component_id: &ComponentId, blob: StateBlob) -> Result<(), SimError>;
}
