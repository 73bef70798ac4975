//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log Shipper - buffering, batching log delivery
#[derive(Parser, Debug)]
#[command(
    name = "log-shipper",
    author,
    version,
    about = "Buffering log-shipping producer",
    long_about = "Reads log lines from a file or stdin, groups them into batches per routing \n\
                  key, and delivers the batches through the configured transport with \n\
                  bounded concurrency and retry backoff."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LOG_SHIPPER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "LOG_SHIPPER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ship log lines through the producer
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "shipper.toml",
        env = "LOG_SHIPPER_CONFIG"
    )]
    pub config: PathBuf,

    /// Input file, one log entry per line ("-" or absent = stdin)
    #[arg(short, long, env = "LOG_SHIPPER_INPUT")]
    pub input: Option<PathBuf>,

    /// Routing topic for every shipped entry
    #[arg(long, default_value = "default", env = "LOG_SHIPPER_TOPIC")]
    pub topic: String,

    /// Routing source (e.g. host or IP)
    #[arg(long, default_value = "", env = "LOG_SHIPPER_SOURCE")]
    pub source: String,

    /// Routing file name, defaults to the input path
    #[arg(long)]
    pub file_name: Option<String>,

    /// Override linger duration from configuration (milliseconds)
    #[arg(long, env = "LOG_SHIPPER_LINGER_MS")]
    pub linger_ms: Option<u64>,

    /// Override worker pool size from configuration
    #[arg(long, env = "LOG_SHIPPER_WORKERS")]
    pub workers: Option<usize>,

    /// Stop after shipping this many entries (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_entries: u64,

    /// Validate configuration and exit without shipping
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LOG_SHIPPER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "shipper.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "shipper.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the retry delay schedule
    #[arg(long)]
    pub schedule: bool,

    /// Show transport parameters
    #[arg(long)]
    pub transport: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
