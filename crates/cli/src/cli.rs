//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// replay-sim - time-driven replay of recorded sensor data through a component graph
#[derive(Parser, Debug)]
#[command(
    name = "replay-sim",
    author,
    version,
    about = "Replay recorded sensor data through a graph of processing components",
    long_about = "Loads a pipeline configuration and a sensor recording, then drives the \n\
                  component graph tick by tick, emitting one frame per tick to the \n\
                  configured sinks."
)]
pub struct Cli {
    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "REPLAY_SIM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true, env = "REPLAY_SIM_LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation
    Run(RunArgs),

    /// Validate a configuration file and its component graph
    Validate(ValidateArgs),

    /// List payload kinds and builtin component modules
    Info(InfoArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "REPLAY_SIM_CONFIG")]
    pub config: PathBuf,

    /// Sensor recording (JSON Lines, one reading per line)
    #[arg(short, long, env = "REPLAY_SIM_RECORDING")]
    pub recording: Option<PathBuf>,

    /// Playback speed, overriding the configured initial speed
    #[arg(long, env = "REPLAY_SIM_SPEED")]
    pub speed: Option<f64>,

    /// Stop after this many frames (0 = until the recording ends)
    #[arg(long, default_value = "0", env = "REPLAY_SIM_MAX_FRAMES")]
    pub max_frames: u64,

    /// Seek to this simulated time (microseconds) before playing
    #[arg(long)]
    pub seek_to: Option<i64>,

    /// Pace ticks against the wall clock instead of running as fast as possible
    #[arg(long, env = "REPLAY_SIM_REALTIME")]
    pub realtime: bool,

    /// Channel buffer size between the engine and the sinks
    #[arg(long, default_value = "100", env = "REPLAY_SIM_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "REPLAY_SIM_METRICS_PORT")]
    pub metrics_port: u16,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "replay-sim",
            "--log-format",
            "json",
            "run",
            "--config",
            "sim.toml",
            "--speed",
            "2.5",
            "--seek-to",
            "1000000",
            "--max-frames",
            "10",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("sim.toml"));
        assert_eq!(args.speed, Some(2.5));
        assert_eq!(args.seek_to, Some(1_000_000));
        assert_eq!(args.max_frames, 10);
        assert!(!args.realtime);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn test_verify_command() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
