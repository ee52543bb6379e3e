//! Native modules and the registry that builds them by name

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{ComponentInputs, ComponentOutput, Input, OutputValue, StateBlob};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

pub const BUILTIN_MODULES: &[&str] = &["passthrough", "moving_average", "counter", "sum"];

/// Logic of one hosted component.
///
/// `process` runs synchronously under the component's lock; stateful
/// modules must round-trip their whole state through `snapshot`/`restore`.
pub trait NativeModule: Send {
    fn process(&mut self, inputs: &ComponentInputs) -> std::result::Result<ComponentOutput, String>;

    fn snapshot(&self) -> std::result::Result<StateBlob, String> {
        Ok(Bytes::new())
    }

    fn restore(&mut self, _blob: &[u8]) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Builds a module for `(component_id, params)`
pub type ModuleFactory =
    Arc<dyn Fn(&str, &HashMap<String, String>) -> Result<Box<dyn NativeModule>> + Send + Sync>;

#[derive(Clone)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("passthrough", |_, _| Ok(Box::new(Passthrough)));
        registry.register("moving_average", |id, params| {
            Ok(Box::new(MovingAverage::from_params(id, params)?))
        });
        registry.register("counter", |_, _| Ok(Box::new(Counter::default())));
        registry.register("sum", |_, _| Ok(Box::new(Sum)));
        registry
    }

    /// Add or replace a module.
    pub fn register<F>(&mut self, module: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&str, &HashMap<String, String>) -> Result<Box<dyn NativeModule>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(module.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }

    pub fn modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(
        &self,
        component: &str,
        module: &str,
        params: &HashMap<String, String>,
    ) -> Result<Box<dyn NativeModule>> {
        let factory = self
            .factories
            .get(module)
            .ok_or_else(|| SandboxError::UnknownModule {
                component: component.to_string(),
                module: module.to_string(),
            })?;
        factory(component, params)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules())
            .finish()
    }
}

/// Numeric value of an upstream output: `value` if present, else the first number.
fn upstream_number(output: &ComponentOutput) -> Option<f64> {
    output
        .get("value")
        .and_then(OutputValue::as_number)
        .or_else(|| output.values().find_map(OutputValue::as_number))
}

/// Available numeric inputs, channels first, each in key order.
fn numeric_inputs(inputs: &ComponentInputs) -> impl Iterator<Item = f64> + '_ {
    let channels = inputs
        .channels
        .values()
        .filter_map(|i| i.as_available())
        .filter_map(|r| r.reading.payload.as_scalar());
    let upstream = inputs
        .upstream
        .values()
        .filter_map(|i| i.as_available())
        .filter_map(upstream_number);
    channels.chain(upstream)
}

fn missing_count(inputs: &ComponentInputs) -> usize {
    inputs.channels.values().filter(|i| i.is_missing()).count()
        + inputs.upstream.values().filter(|i| i.is_missing()).count()
}

fn encode_state<T: Serialize>(state: &T) -> std::result::Result<StateBlob, String> {
    serde_json::to_vec(state)
        .map(Bytes::from)
        .map_err(|e| e.to_string())
}

fn decode_state<T: for<'de> Deserialize<'de>>(blob: &[u8]) -> std::result::Result<T, String> {
    serde_json::from_slice(blob).map_err(|e| e.to_string())
}

/// Forwards every numeric channel and upstream value under its source name.
struct Passthrough;

impl NativeModule for Passthrough {
    fn process(&mut self, inputs: &ComponentInputs) -> std::result::Result<ComponentOutput, String> {
        let mut out = ComponentOutput::new();
        for (channel, input) in &inputs.channels {
            if let Input::Available(r) = input {
                if let Some(v) = r.reading.payload.as_scalar() {
                    out.insert(channel.to_string(), OutputValue::Number(v));
                }
                if r.stale {
                    out.insert(format!("{channel}.stale"), OutputValue::Flag(true));
                }
            }
        }
        for (id, input) in &inputs.upstream {
            if let Some(v) = input.as_available().and_then(upstream_number) {
                out.insert(id.to_string(), OutputValue::Number(v));
            }
        }
        out.insert(
            "missing".to_string(),
            OutputValue::Number(missing_count(inputs) as f64),
        );
        Ok(out)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MovingAverageState {
    values: VecDeque<f64>,
}

/// Rolling mean over the first numeric input.
struct MovingAverage {
    window: usize,
    state: MovingAverageState,
}

impl MovingAverage {
    const DEFAULT_WINDOW: usize = 5;

    fn from_params(component: &str, params: &HashMap<String, String>) -> Result<Self> {
        let window = match params.get("window") {
            None => Self::DEFAULT_WINDOW,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&w| w > 0)
                .ok_or_else(|| {
                    SandboxError::invalid_param(component, "window", format!("expected a positive integer, got '{raw}'"))
                })?,
        };
        Ok(Self {
            window,
            state: MovingAverageState::default(),
        })
    }
}

impl NativeModule for MovingAverage {
    fn process(&mut self, inputs: &ComponentInputs) -> std::result::Result<ComponentOutput, String> {
        let sample = numeric_inputs(inputs)
            .next()
            .ok_or_else(|| "no numeric input available".to_string())?;

        let values = &mut self.state.values;
        values.push_back(sample);
        while values.len() > self.window {
            values.pop_front();
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        Ok(ComponentOutput::from([
            ("value".to_string(), OutputValue::Number(mean)),
            ("samples".to_string(), OutputValue::Number(values.len() as f64)),
        ]))
    }

    fn snapshot(&self) -> std::result::Result<StateBlob, String> {
        encode_state(&self.state)
    }

    fn restore(&mut self, blob: &[u8]) -> std::result::Result<(), String> {
        self.state = decode_state(blob)?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    count: u64,
}

impl NativeModule for Counter {
    fn process(&mut self, _inputs: &ComponentInputs) -> std::result::Result<ComponentOutput, String> {
        self.count += 1;
        Ok(ComponentOutput::from([(
            "count".to_string(),
            OutputValue::Number(self.count as f64),
        )]))
    }

    fn snapshot(&self) -> std::result::Result<StateBlob, String> {
        encode_state(self)
    }

    fn restore(&mut self, blob: &[u8]) -> std::result::Result<(), String> {
        *self = decode_state(blob)?;
        Ok(())
    }
}

/// Adds every available numeric input.
struct Sum;

impl NativeModule for Sum {
    fn process(&mut self, inputs: &ComponentInputs) -> std::result::Result<ComponentOutput, String> {
        let total: f64 = numeric_inputs(inputs).sum();
        Ok(ComponentOutput::from([
            ("value".to_string(), OutputValue::Number(total)),
            (
                "missing".to_string(),
                OutputValue::Number(missing_count(inputs) as f64),
            ),
        ]))
    }
}
