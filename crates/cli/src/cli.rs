//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Perception Sim - deterministic capture scheduling for synthetic perception data
#[derive(Parser, Debug)]
#[command(
    name = "perception-sim",
    author,
    version,
    about = "Deterministic sensor capture simulation",
    long_about = "Runs a capture rig described by a scenario file on a simulated clock.\n\n\
                  Schedules sensor captures, collects sensor output, annotations and \n\
                  metrics from producers, and dispatches finished captures to the \n\
                  configured endpoints."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "PERCEPTION_SIM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "PERCEPTION_SIM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario
    Run(RunArgs),

    /// Validate a scenario file without running it
    Validate(ValidateArgs),

    /// Display scenario information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to scenario file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "scenario.toml",
        env = "PERCEPTION_SIM_CONFIG"
    )]
    pub config: PathBuf,

    /// Override ticks per sequence
    #[arg(long, env = "PERCEPTION_SIM_TICKS")]
    pub ticks: Option<u64>,

    /// Override number of sequences
    #[arg(long, env = "PERCEPTION_SIM_SEQUENCES")]
    pub sequences: Option<u32>,

    /// Override the engine time scale
    #[arg(long, env = "PERCEPTION_SIM_TIME_SCALE")]
    pub time_scale: Option<f64>,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Threads resolving deferred (readback) reports
    #[arg(long, default_value = "2", env = "PERCEPTION_SIM_READBACK_THREADS")]
    pub readback_threads: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "PERCEPTION_SIM_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to scenario file to validate
    #[arg(short, long, default_value = "scenario.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to scenario file
    #[arg(short, long, default_value = "scenario.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed sensor information
    #[arg(long)]
    pub sensors: bool,

    /// Show endpoint configuration
    #[arg(long)]
    pub endpoints: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
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
