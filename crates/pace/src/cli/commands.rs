//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pace - inspect pacing limits for LLM providers
#[derive(Parser, Debug)]
#[command(name = "pace")]
#[command(about = "Inspect rate-limit presets, adaptive penalties and retry policy", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Load this configuration file instead of the layered defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, default_value = "human")]
    pub log_format: OutputFormat,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve effective limits for provider/model pairs
    Limits {
        /// Targets as `provider:model`
        #[arg(required = true)]
        targets: Vec<String>,

        /// Tier to resolve against
        #[arg(long)]
        tier: Option<String>,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Print the resolved retry policy
    Retry,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// JSON
    Json,
}
