//! Command-line interface module.

mod commands;
mod limits;

pub use commands::{Cli, Commands, OutputFormat};
pub use limits::{show_limits, show_retry};
