//! # Observability
//!
//! Tracing setup, the Prometheus exporter and per-frame metrics.
//!
//! ```ignore
//! observability::init_logging(LogFormat::Compact, "info")?;
//! observability::init_metrics(([0, 0, 0, 0], 9000).into())?;
//!
//! while let Some(frame) = frames.recv().await {
//!     observability::record_frame_metrics(&frame);
//!     aggregator.update(&frame);
//! }
//! ```

pub mod metrics;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::metrics::{
    record_frame_metrics, FrameMetricsAggregator, RunningStats, RunSummary, StatsSummary,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human readable
    Pretty,
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (pretty|compact|json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
pub fn init_logging(format: LogFormat, default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry
            .with(tracing_fmt::layer().compact().with_target(false))
            .try_init(),
    }
    .context("failed to initialize tracing subscriber")?;

    tracing::debug!(%format, "logging initialized");
    Ok(())
}

/// Serve Prometheus metrics on `addr`. Needs a running tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus recorder")?;

    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}
