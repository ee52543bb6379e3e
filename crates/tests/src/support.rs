//! Shared fixtures

use std::sync::Arc;

use contracts::{PipelineConfig, SensorPayload, SensorReading, Timestamp};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sandbox::NativeSandbox;
use sensor_store::InMemorySensorStore;
use sim_engine::SimulationEngine;

pub type Engine = SimulationEngine<InMemorySensorStore, NativeSandbox>;

pub fn config(value: serde_json::Value) -> PipelineConfig {
    serde_json::from_value(value).unwrap()
}

/// `channel` sampled every `step` over `[0, end]`, value = index.
pub fn ramp(channel: &str, step: Timestamp, end: Timestamp) -> InMemorySensorStore {
    InMemorySensorStore::from_readings(
        (0..=end / step)
            .map(|k| SensorReading::new(channel, k * step, SensorPayload::Scalar(k as f64))),
    )
}

pub async fn loaded(store: InMemorySensorStore, config: PipelineConfig) -> Engine {
    let sandbox = NativeSandbox::from_config(&config).unwrap();
    let mut engine = SimulationEngine::new(Arc::new(store), Arc::new(sandbox));
    engine.load(config).await.unwrap();
    engine
}

/// Seeded generator so property inputs are reproducible
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
