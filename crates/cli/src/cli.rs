//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use observability::LogFormat;
use std::path::PathBuf;

/// chunkline - output-side chunking pipeline
#[derive(Parser, Debug)]
#[command(
    name = "chunkline",
    author,
    version,
    about = "Output-side event chunking pipeline",
    long_about = "Routes tagged events to outputs, groups them into chunks by time bucket,\n\
                  tag and record fields, and flushes chunks through log, file or\n\
                  forward writers."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CHUNKLINE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format: json, pretty or compact
    #[arg(
        long,
        default_value = "pretty",
        global = true,
        env = "CHUNKLINE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSON lines event file through the configured outputs
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
        default_value = "chunkline.toml",
        env = "CHUNKLINE_CONFIG"
    )]
    pub config: PathBuf,

    /// JSON lines input, one `{"tag", "time", "record"}` object per line ("-" = stdin)
    #[arg(short, long, default_value = "-")]
    pub input: PathBuf,

    /// Replay timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "CHUNKLINE_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CHUNKLINE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "chunkline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "chunkline.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
