//! Concurrency, speed, timeout and seek-bound scenarios

use std::time::Duration;

use contracts::{FailureKind, OutputValue, PipelineConfig, SimError};
use sensor_store::InMemorySensorStore;
use serde_json::json;
use sim_engine::EngineState;
use tokio::time::Instant;

use crate::support::{config, loaded, ramp};

/// A -> B -> C, with D sharing A's parallel group. A and D each take 50 ms.
fn grouped_chain() -> PipelineConfig {
    config(json!({
        "simulation": { "base_tick_us": 100_000, "range_start_us": 0, "range_end_us": 1_000_000 },
        "components": [
            { "id": "A", "module": "counter", "parallel_group": "front", "timeout_ms": 500,
              "params": { "fault.delay_ms": "50" }, "failure_policy": "continue" },
            { "id": "B", "module": "sum", "depends_on": ["A"], "failure_policy": "continue" },
            { "id": "C", "module": "sum", "depends_on": ["B"], "failure_policy": "continue" },
            { "id": "D", "module": "counter", "parallel_group": "front", "timeout_ms": 500,
              "params": { "fault.delay_ms": "50" }, "failure_policy": "continue" }
        ],
    }))
}

#[tokio::test(start_paused = true)]
async fn test_parallel_group_then_chain() {
    let mut engine = loaded(InMemorySensorStore::new(), grouped_chain()).await;

    let started = Instant::now();
    let frame = engine.step().await.unwrap().unwrap();
    let elapsed = started.elapsed();

    // Both 50 ms members overlap.
    assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(100), "{elapsed:?}");

    assert_eq!(frame.executed_ids(), vec!["A", "D", "B", "C"]);
    let stage = |id: &str| frame.result(id).unwrap().stage;
    assert_eq!(stage("A"), stage("D"));
    assert!(stage("D") < stage("B"));
    assert!(stage("B") < stage("C"));
    assert!(frame.results.iter().all(|r| r.is_success()));
    assert_eq!(frame.metrics.stages, 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_runs_are_identical() {
    type Trace = Vec<Vec<(String, usize, Option<Vec<(String, OutputValue)>>)>>;

    async fn trace() -> Trace {
        let mut engine = loaded(InMemorySensorStore::new(), grouped_chain()).await;
        let mut out = Vec::new();
        for _ in 0..5 {
            let frame = engine.step().await.unwrap().unwrap();
            out.push(
                frame
                    .results
                    .iter()
                    .map(|r| {
                        (
                            r.component_id.to_string(),
                            r.stage,
                            r.output()
                                .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
                        )
                    })
                    .collect(),
            );
        }
        out
    }

    let first = trace().await;
    assert_eq!(first.len(), 5);
    for _ in 0..3 {
        assert_eq!(trace().await, first);
    }
    // C sums B, which sums A's running count.
    let last_c = first[4].iter().find(|(id, ..)| id == "C").unwrap();
    let value = last_c
        .2
        .as_ref()
        .and_then(|o| o.iter().find(|(k, _)| k == "value"))
        .and_then(|(_, v)| v.as_number());
    assert_eq!(value, Some(5.0));
}

#[tokio::test]
async fn test_speed_zero_holds_and_negative_speed_rejected() {
    let mut engine = loaded(
        ramp("speed", 10_000, 500_000),
        config(json!({
            "simulation": { "base_tick_us": 10_000 },
            "components": [
                { "id": "count", "module": "counter", "failure_policy": "continue" }
            ],
        })),
    )
    .await;

    engine.set_speed(0.0).unwrap();
    engine.play().unwrap();
    let before = engine.current_time();
    for _ in 0..100 {
        assert!(engine.step().await.unwrap().is_none());
    }
    assert_eq!(engine.current_time(), before);
    assert_eq!(engine.state(), EngineState::Running);

    engine.set_speed(2.0).unwrap();
    let err = engine.set_speed(-1.0).unwrap_err();
    assert!(matches!(err, SimError::InvalidArgument { .. }));
    assert_eq!(engine.speed(), Some(2.0));

    let frame = engine.step().await.unwrap().unwrap();
    assert_eq!(frame.timestamp_us, 20_000);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_component_times_out_every_tick() {
    let mut engine = loaded(
        InMemorySensorStore::new(),
        config(json!({
            "simulation": {
                "base_tick_us": 10_000,
                "range_start_us": 0,
                "range_end_us": 1_000_000,
                "failure_escalation_threshold": 1000,
            },
            "components": [
                { "id": "stuck", "module": "counter", "timeout_ms": 20,
                  "params": { "fault.hang": "true" }, "failure_policy": "continue" },
                { "id": "count", "module": "counter", "failure_policy": "continue" }
            ],
        })),
    )
    .await;

    let mut last = 0;
    for _ in 0..5 {
        let started = Instant::now();
        let frame = engine.step().await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(frame.timestamp_us > last);
        last = frame.timestamp_us;

        let stuck = frame.result("stuck").unwrap();
        assert_eq!(stuck.failure().map(|f| f.kind), Some(FailureKind::Timeout));
        assert_eq!(stuck.attempts, 1);
        assert!(frame.result("count").unwrap().is_success());
    }
    assert_eq!(last, 50_000);
}

#[tokio::test]
async fn test_seek_outside_range_changes_nothing() {
    let mut engine = loaded(
        ramp("speed", 10_000, 100_000),
        config(json!({
            "simulation": { "base_tick_us": 10_000 },
            "components": [
                { "id": "count", "module": "counter", "failure_policy": "continue" }
            ],
        })),
    )
    .await;
    engine.step().await.unwrap();
    engine.step().await.unwrap();
    let checkpoints = engine.checkpoint_times();

    for target in [-1, 100_001, i64::MAX] {
        let err = engine.seek(target).await.unwrap_err();
        assert!(matches!(err, SimError::OutOfRange { .. }), "{target}: {err}");
        assert_eq!(engine.current_time(), Some(20_000));
        assert_eq!(engine.state(), EngineState::Paused);
    }
    assert_eq!(engine.checkpoint_times(), checkpoints);
}
