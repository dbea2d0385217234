//! Pace CLI binary.
//!
//! Prints what the governor would allow for provider/model pairs under the
//! current configuration and environment.

use clap::Parser;
use pace::{Governor, PaceConfig, telemetry};

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, OutputFormat, show_limits, show_retry};

    let cli = Cli::parse();

    match cli.log_format {
        OutputFormat::Human => telemetry::init_console_telemetry()?,
        OutputFormat::Json => telemetry::init_json_telemetry()?,
    }

    let governor = match &cli.config {
        Some(path) => Governor::from_config(PaceConfig::from_file(path)?),
        None => Governor::load()?,
    };

    match cli.command {
        Commands::Limits {
            targets,
            tier,
            format,
        } => show_limits(&governor, &targets, tier.as_deref(), format)?,
        Commands::Retry => show_retry(&governor)?,
    }

    Ok(())
}
