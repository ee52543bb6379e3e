//! `run` command implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::SimError;
use dispatcher::{create_dispatcher, MetricsSnapshot};
use observability::{record_frame_metrics, FrameMetricsAggregator};
use sandbox::NativeSandbox;
use sensor_store::InMemorySensorStore;
use sim_engine::{spawn_driver, DriverConfig, SimulationEngine};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;

pub async fn run_simulation(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }
    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    if args.metrics_port != 0 {
        observability::init_metrics(SocketAddr::from(([0, 0, 0, 0], args.metrics_port)))?;
    }

    let store = match &args.recording {
        Some(path) => sensor_store::load_recording(path)
            .with_context(|| format!("failed to load recording {}", path.display()))?,
        None => {
            warn!("no recording given, every channel will be unavailable");
            InMemorySensorStore::new()
        }
    }
    .with_min_quality(config.interpolation.min_quality);
    info!(
        readings = store.len(),
        channels = store.channels().len(),
        "recording loaded"
    );

    let sandbox = NativeSandbox::from_config(&config).map_err(SimError::from)?;
    let sinks = config.sinks.clone();
    let components = config.components.len();

    let mut engine = SimulationEngine::new(Arc::new(store), Arc::new(sandbox));
    engine.load(config).await.context("failed to load simulation")?;
    if let Some(speed) = args.speed {
        engine.set_speed(speed)?;
    }
    if let Some(target) = args.seek_to {
        let landed = engine.seek(target).await?;
        info!(target, landed, "initial seek");
    }
    if let Some((start, end)) = engine.range() {
        info!(start, end, components, "simulation loaded");
    }

    let (handle, mut frames, driver) = spawn_driver(
        engine,
        DriverConfig {
            frame_capacity: args.buffer_size,
            realtime: args.realtime,
            exit_on_complete: true,
            ..DriverConfig::default()
        },
    );
    let (sink_tx, sink_rx) = mpsc::channel(args.buffer_size.max(1));
    let dispatcher = create_dispatcher(sinks, sink_rx)?.spawn();

    handle.play().await?;

    let started = Instant::now();
    let mut aggregator = FrameMetricsAggregator::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                record_frame_metrics(&frame);
                aggregator.update(&frame);
                if sink_tx.send(frame).await.is_err() {
                    warn!("dispatcher stopped early");
                    break;
                }
                if args.max_frames > 0 && aggregator.total_frames >= args.max_frames {
                    info!(frames = aggregator.total_frames, "frame limit reached");
                    break;
                }
            }
            _ = &mut shutdown => {
                warn!("received shutdown signal, stopping simulation");
                break;
            }
        }
    }

    // Closing the frame stream unblocks a driver waiting on a full channel.
    drop(frames);
    handle.shutdown().await;
    let engine = driver
        .await
        .map_err(|e| CliError::driver(e.to_string()))?;

    drop(sink_tx);
    let sink_totals = dispatcher
        .await
        .map_err(|e| CliError::driver(e.to_string()))?;

    info!(
        state = %engine.state(),
        sim_time = ?engine.current_time(),
        frames = aggregator.total_frames,
        "simulation finished"
    );
    print_summary(&aggregator, &sink_totals, started.elapsed());
    Ok(())
}

fn print_summary(
    aggregator: &FrameMetricsAggregator,
    sinks: &[(String, MetricsSnapshot)],
    elapsed: Duration,
) {
    println!();
    print!("{}", aggregator.summary());
    println!("Wall time: {:.2}s", elapsed.as_secs_f64());
    if !sinks.is_empty() {
        println!("Sinks:");
        for (name, m) in sinks {
            println!(
                "  {name}: written={} failed={} dropped={}",
                m.written, m.failed, m.dropped
            );
        }
    }
    println!();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
