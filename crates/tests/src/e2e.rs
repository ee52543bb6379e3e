//! Recording -> engine -> driver -> dispatcher

use std::collections::HashMap;
use std::sync::Arc;

use config_loader::{ConfigFormat, ConfigLoader};
use contracts::{
    FrameHealth, SensorPayload, SensorReading, SimulationFrame, SinkConfig, SinkType,
};
use dispatcher::create_dispatcher;
use observability::FrameMetricsAggregator;
use sandbox::NativeSandbox;
use sim_engine::{spawn_driver, DriverConfig, EngineState, SimulationEngine};
use tokio::sync::mpsc;

const CONFIG: &str = r#"
[simulation]
run_id = "e2e"
base_tick_us = 20000

[checkpoint]
interval_us = 100000
retention_us = 1000000

[[channels]]
id = "speed"
kind = "scalar"

[[components]]
id = "raw"
module = "passthrough"
inputs = ["speed"]
parallel_group = "front"
failure_policy = "continue"

[[components]]
id = "ticks"
module = "counter"
parallel_group = "front"
failure_policy = "continue"

[[components]]
id = "smooth"
module = "moving_average"
inputs = ["speed"]
depends_on = ["raw"]
failure_policy = "fail_fast"
params = { window = "4" }

[[components]]
id = "total"
module = "sum"
depends_on = ["smooth", "ticks"]
frequency_hz = 10.0
failure_policy = "continue"
"#;

#[tokio::test]
async fn test_recording_through_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("drive.jsonl");
    let frames_path = dir.path().join("frames.jsonl");

    let readings: Vec<SensorReading> = (0..=50)
        .map(|k| SensorReading::new("speed", k * 10_000, SensorPayload::Scalar(k as f64 * 0.5)))
        .collect();
    sensor_store::write_recording(&recording, &readings).unwrap();
    let store = sensor_store::load_recording(&recording).unwrap();

    let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
    let sandbox = NativeSandbox::from_config(&config).unwrap();
    let mut engine = SimulationEngine::new(Arc::new(store), Arc::new(sandbox));
    engine.load(config).await.unwrap();
    assert_eq!(engine.range(), Some((0, 500_000)));

    let (handle, mut frames, driver) = spawn_driver(
        engine,
        DriverConfig {
            realtime: false,
            exit_on_complete: true,
            ..DriverConfig::default()
        },
    );
    let (sink_tx, sink_rx) = mpsc::channel(64);
    let dispatcher = create_dispatcher(
        vec![
            SinkConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                queue_capacity: 64,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "file".into(),
                sink_type: SinkType::File,
                queue_capacity: 64,
                params: HashMap::from([(
                    "path".to_string(),
                    frames_path.display().to_string(),
                )]),
            },
        ],
        sink_rx,
    )
    .unwrap()
    .spawn();

    handle.play().await.unwrap();

    let mut aggregator = FrameMetricsAggregator::new();
    let mut times = Vec::new();
    while let Some(frame) = frames.recv().await {
        aggregator.update(&frame);
        times.push(frame.timestamp_us);
        sink_tx.send(frame).await.unwrap();
    }
    drop(sink_tx);

    let engine = driver.await.unwrap();
    assert_eq!(engine.state(), EngineState::Completed);
    let sink_totals = dispatcher.await.unwrap();

    assert_eq!(times.len(), 25);
    assert!(times.windows(2).all(|w| w[1] - w[0] == 20_000));

    let summary = aggregator.summary();
    assert_eq!(summary.total_frames, 25);
    assert!(summary.failures.is_empty(), "{summary}");

    for (name, totals) in &sink_totals {
        assert_eq!(totals.written, 25, "{name}");
        assert_eq!(totals.last_written_us, Some(500_000));
    }

    let written: Vec<SimulationFrame> = std::fs::read_to_string(&frames_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(written.len(), 25);
    assert!(written.iter().all(|f| f.health == FrameHealth::Nominal));

    // Same-group components share the first stage; the 10 Hz sum skips ticks.
    let first = &written[0];
    assert_eq!(first.executed_ids(), vec!["raw", "ticks", "smooth", "total"]);
    assert_eq!(first.result("raw").unwrap().stage, 0);
    assert_eq!(first.result("ticks").unwrap().stage, 0);
    let total_runs = written.iter().filter(|f| f.result("total").is_some()).count();
    assert!((4..=6).contains(&total_runs), "{total_runs}");
}
