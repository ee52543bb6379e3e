//! In-process sandbox

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use contracts::{
    ComponentId, ComponentInputs, ComponentOutput, ComponentSandbox, PipelineConfig, SimError,
    StateBlob,
};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SandboxError};
use crate::fault::FaultPlan;
use crate::modules::{ModuleRegistry, NativeModule};

struct HostedComponent {
    module_name: String,
    method: String,
    module: Mutex<Box<dyn NativeModule>>,
    faults: FaultPlan,
    invocations: AtomicU64,
}

/// Hosts every component of one pipeline in this process.
///
/// Each component's module sits behind its own lock, so distinct components
/// can be invoked concurrently.
pub struct NativeSandbox {
    components: HashMap<ComponentId, HostedComponent>,
}

impl NativeSandbox {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::with_registry(config, &ModuleRegistry::with_builtins())
    }

    pub fn with_registry(config: &PipelineConfig, registry: &ModuleRegistry) -> Result<Self> {
        let mut components = HashMap::with_capacity(config.components.len());
        for desc in &config.components {
            let module = registry.build(&desc.id, &desc.module, &desc.params)?;
            let faults = FaultPlan::from_params(&desc.id, &desc.params)?;
            if !faults.is_empty() {
                warn!(component = %desc.id, ?faults, "fault injection enabled");
            }
            components.insert(
                desc.id.clone(),
                HostedComponent {
                    module_name: desc.module.clone(),
                    method: desc.method.clone(),
                    module: Mutex::new(module),
                    faults,
                    invocations: AtomicU64::new(0),
                },
            );
        }
        debug!(components = components.len(), "sandbox loaded");
        Ok(Self { components })
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn module_of(&self, component_id: &str) -> Option<&str> {
        self.components
            .get(component_id)
            .map(|c| c.module_name.as_str())
    }

    /// Invocations attempted so far, including failed and timed-out ones.
    pub fn invocations(&self, component_id: &str) -> u64 {
        self.components
            .get(component_id)
            .map_or(0, |c| c.invocations.load(Ordering::Relaxed))
    }

    fn hosted(&self, component_id: &ComponentId) -> Result<&HostedComponent> {
        self.components
            .get(component_id)
            .ok_or_else(|| SandboxError::UnknownComponent {
                component: component_id.to_string(),
            })
    }
}

impl ComponentSandbox for NativeSandbox {
    #[instrument(
        name = "sandbox_invoke",
        skip(self, inputs, timeout),
        fields(component = %component_id, at = inputs.at)
    )]
    async fn invoke(
        &self,
        component_id: &ComponentId,
        method: &str,
        inputs: ComponentInputs,
        timeout: Duration,
    ) -> std::result::Result<ComponentOutput, SimError> {
        let hosted = self.hosted(component_id)?;
        if method != hosted.method {
            return Err(SimError::component_execution(
                component_id.as_str(),
                format!("module '{}' has no method '{method}'", hosted.module_name),
            ));
        }
        let n = hosted.invocations.fetch_add(1, Ordering::Relaxed) + 1;

        let work = async {
            if let Some(delay) = hosted.faults.delay {
                tokio::time::sleep(delay).await;
            }
            if hosted.faults.hang {
                std::future::pending::<()>().await;
            }
            if hosted.faults.fails(n, inputs.at) {
                return Err(SimError::component_execution(
                    component_id.as_str(),
                    format!("injected failure on invocation {n}"),
                ));
            }
            hosted
                .module
                .lock()
                .process(&inputs)
                .map_err(|message| SimError::component_execution(component_id.as_str(), message))
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(SimError::component_timeout(
                component_id.as_str(),
                timeout.as_millis() as u64,
            )),
        }
    }

    async fn snapshot_state(
        &self,
        component_id: &ComponentId,
    ) -> std::result::Result<StateBlob, SimError> {
        let hosted = self.hosted(component_id)?;
        let blob = hosted.module.lock().snapshot().map_err(|message| {
            SandboxError::CorruptState {
                component: component_id.to_string(),
                message,
            }
        })?;
        Ok(blob)
    }

    async fn restore_state(
        &self,
        component_id: &ComponentId,
        blob: StateBlob,
    ) -> std::result::Result<(), SimError> {
        let hosted = self.hosted(component_id)?;
        hosted.module.lock().restore(&blob).map_err(|message| {
            SandboxError::CorruptState {
                component: component_id.to_string(),
                message,
            }
        })?;
        Ok(())
    }
}
