//! Command-line interface for docker-converge.
//!
//! This module provides the commands and output formatting used by the
//! `docker-converge` binary.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
