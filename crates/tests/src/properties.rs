//! Graph, timing, seek, checkpoint and interpolation properties

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ComponentId, ComponentInputs, ComponentSandbox, InterpolationMethod, InterpolationSettings,
    SchedulerSnapshot, SensorPayload, SensorReading, SimError,
};
use rand::seq::SliceRandom;
use rand::Rng;
use sandbox::NativeSandbox;
use sensor_bridge::{Interpolator, SensorDataBridge};
use sensor_store::InMemorySensorStore;
use serde_json::json;
use sim_engine::EngineState;
use state_manager::{CheckpointPolicy, StateManager};
use timing::period_for;

use crate::support::{config, loaded, ramp, seeded_rng};

#[tokio::test]
async fn test_topological_order_respects_every_dependency() {
    let mut rng = seeded_rng(0x5eed);

    for _ in 0..40 {
        let n = rng.random_range(2..12);
        // A random permutation fixes a hidden topological rank.
        let mut rank: Vec<usize> = (0..n).collect();
        rank.shuffle(&mut rng);
        let components: Vec<_> = (0..n)
            .map(|i| {
                let deps: Vec<String> = (0..n)
                    .filter(|&j| rank[j] < rank[i] && rng.random_ratio(1, 3))
                    .map(|j| format!("c{j}"))
                    .collect();
                let group = rng.random_ratio(1, 4).then(|| "g".to_string());
                json!({
                    "id": format!("c{i}"),
                    "module": "counter",
                    "depends_on": deps,
                    "parallel_group": group,
                    "failure_policy": "continue",
                })
            })
            .collect();

        let engine = loaded(
            InMemorySensorStore::new(),
            config(json!({
                "simulation": { "range_start_us": 0, "range_end_us": 100_000 },
                "components": components,
            })),
        )
        .await;
        assert_eq!(engine.state(), EngineState::Loaded);

        let graph = engine.graph().unwrap();
        let mut position = vec![0; graph.len()];
        for (pos, &idx) in graph.order().iter().enumerate() {
            position[idx] = pos;
        }
        let mut stage_of = vec![0; graph.len()];
        for (s, stage) in graph.stages().iter().enumerate() {
            for &idx in &stage.nodes {
                stage_of[idx] = s;
            }
        }

        assert_eq!(graph.order().len(), n);
        for idx in 0..graph.len() {
            for &dep in graph.dependencies(idx) {
                assert!(position[dep] < position[idx]);
                assert!(stage_of[dep] < stage_of[idx]);
            }
        }
    }
}

#[tokio::test]
async fn test_execution_count_follows_frequency() {
    let base_tick = 33_333;
    for frequency_hz in [1.0, 3.0, 7.0, 10.0, 30.0] {
        let mut engine = loaded(
            InMemorySensorStore::new(),
            config(json!({
                "simulation": {
                    "base_tick_us": base_tick,
                    "range_start_us": 0,
                    "range_end_us": 2_000_000,
                },
                "components": [
                    { "id": "c", "module": "counter", "frequency_hz": frequency_hz, "failure_policy": "continue" }
                ],
            })),
        )
        .await;

        let mut ticks = Vec::new();
        let mut executions = 0i64;
        while engine.state() != EngineState::Completed {
            if let Some(frame) = engine.step().await.unwrap() {
                ticks.push(frame.timestamp_us);
                executions += frame.result("c").is_some() as i64;
            }
        }

        let span = ticks.last().unwrap() - ticks.first().unwrap();
        let expected = span / period_for(frequency_hz);
        assert!(
            (executions - expected).abs() <= 1,
            "{frequency_hz} Hz: {executions} executions over {span} us, expected {expected} ± 1"
        );
    }
}

async fn component_states(sandbox: &NativeSandbox, ids: &[&str]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for id in ids {
        let blob = sandbox.snapshot_state(&ComponentId::from(*id)).await.unwrap();
        out.push(blob.to_vec());
    }
    out
}

#[tokio::test]
async fn test_seek_is_idempotent() {
    for seek_mode in ["replay", "snap_to_checkpoint"] {
        let mut engine = loaded(
            ramp("speed", 10_000, 200_000),
            config(json!({
                "simulation": { "base_tick_us": 10_000, "seek_mode": seek_mode },
                "checkpoint": { "interval_us": 30_000, "retention_us": 1_000_000 },
                "components": [
                    { "id": "avg", "module": "moving_average", "inputs": ["speed"], "params": { "window": "3" }, "failure_policy": "continue" },
                    { "id": "count", "module": "counter", "failure_policy": "continue" }
                ],
            })),
        )
        .await;
        for _ in 0..12 {
            engine.step().await.unwrap();
        }

        let first = engine.seek(75_000).await.unwrap();
        let first_states = component_states(engine.sandbox(), &["avg", "count"]).await;
        let second = engine.seek(75_000).await.unwrap();
        let second_states = component_states(engine.sandbox(), &["avg", "count"]).await;

        assert_eq!(first, second, "{seek_mode}");
        assert_eq!(engine.current_time(), Some(second));
        assert_eq!(first_states, second_states, "{seek_mode}");
        assert_eq!(engine.state(), EngineState::Paused);
    }
}

#[tokio::test]
async fn test_checkpoint_restore_round_trip() {
    let config = config(json!({
        "components": [
            { "id": "avg", "module": "moving_average", "inputs": ["speed"], "failure_policy": "continue" },
            { "id": "count", "module": "counter", "failure_policy": "continue" }
        ],
    }));
    let ids: Vec<ComponentId> = vec!["avg".into(), "count".into()];
    let sandbox = NativeSandbox::from_config(&config).unwrap();
    let bridge = Arc::new(SensorDataBridge::from_config(
        Arc::new(ramp("speed", 10_000, 200_000)),
        &config,
    ));
    let mut manager = StateManager::new(
        "round-trip",
        CheckpointPolicy {
            interval_us: 10_000,
            retention_us: 1_000_000,
            max_checkpoints: 16,
        },
    );

    async fn tick(sandbox: &NativeSandbox, bridge: &Arc<SensorDataBridge<InMemorySensorStore>>, at: i64) {
        bridge.refresh(at).await.unwrap();
        let view = bridge.view();
        let reading = view.get(&"speed".into(), at).await.unwrap();
        let mut inputs = ComponentInputs::new(at);
        inputs
            .channels
            .insert("speed".into(), contracts::Input::Available(reading));
        for id in ["avg", "count"] {
            sandbox
                .invoke(&id.into(), "process", inputs.clone(), Duration::from_secs(1))
                .await
                .unwrap();
        }
    }

    for at in [10_000, 25_000, 40_000] {
        tick(&sandbox, &bridge, at).await;
    }
    let states_before = StateManager::capture_components(&sandbox, &ids).await.unwrap();
    let bridge_before = bridge.snapshot();
    manager
        .checkpoint(40_000, &sandbox, &ids, bridge.snapshot(), SchedulerSnapshot::default())
        .await
        .unwrap();

    for at in [50_000, 90_000, 150_000] {
        tick(&sandbox, &bridge, at).await;
    }
    assert_ne!(
        StateManager::capture_components(&sandbox, &ids).await.unwrap(),
        states_before
    );

    let checkpoint = manager.restore(40_000, &sandbox, &ids).await.unwrap();
    bridge.restore(&checkpoint.bridge);

    assert_eq!(
        StateManager::capture_components(&sandbox, &ids).await.unwrap(),
        states_before
    );
    assert_eq!(bridge.snapshot(), bridge_before);
}

#[tokio::test]
async fn test_linear_interpolation_and_stale_tail() {
    let store = InMemorySensorStore::from_readings([
        SensorReading::new("speed", 0, SensorPayload::Scalar(2.0)),
        SensorReading::new("speed", 100_000, SensorPayload::Scalar(7.0)),
    ]);
    let interpolator = Interpolator::new(&InterpolationSettings::default());
    let channel = "speed".into();

    let (t0, t1, v0, v1) = (0i64, 100_000i64, 2.0f64, 7.0f64);
    for t in [0, 1, 12_345, 50_000, 77_777, 99_999, 100_000] {
        let got = interpolator.lookup(&store, &channel, t).await.unwrap();
        let expected = v0 + (v1 - v0) * (t - t0) as f64 / (t1 - t0) as f64;
        let value = got.reading.payload.as_scalar().unwrap();
        assert!((value - expected).abs() < 1e-9, "t={t}: {value} != {expected}");
        assert!(!got.stale);
    }

    // Past the last reading: last known good, flagged stale.
    let tail = interpolator.lookup(&store, &channel, 150_000).await.unwrap();
    assert_eq!(tail.method, InterpolationMethod::LastKnownGood);
    assert!(tail.stale);
    assert_eq!(tail.reading.payload.as_scalar(), Some(7.0));

    // Beyond the stale horizon nothing is served.
    let err = interpolator
        .lookup(&store, &channel, 100_000 + 2_000_000)
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::DataUnavailable { .. }));
}

#[tokio::test]
async fn test_min_quality_filters_bracket() {
    let store = InMemorySensorStore::from_readings([
        SensorReading::new("speed", 0, SensorPayload::Scalar(1.0)),
        SensorReading::new("speed", 50_000, SensorPayload::Scalar(100.0)).with_quality(0.1),
        SensorReading::new("speed", 100_000, SensorPayload::Scalar(3.0)),
    ])
    .with_min_quality(Some(0.5));
    let interpolator = Interpolator::new(&InterpolationSettings::default());

    let got = interpolator
        .lookup(&store, &"speed".into(), 50_000)
        .await
        .unwrap();
    assert_eq!(got.method, InterpolationMethod::Linear);
    assert_eq!(got.reading.payload.as_scalar(), Some(2.0));
}
