//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docker-converge - Declarative desired-state reconciliation for Docker resources.
#[derive(Parser, Debug)]
#[command(name = "docker-converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest.
    #[arg(short, long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new project with a manifest template.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the manifest.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Reconcile in check mode and display the plan.
    Plan {
        /// Show per-field changes and sub-operations.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply the plan to the backend.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue after a failed action.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Check for drift between the manifest and the backend.
    Drift,

    /// Show the policy table of a resource kind.
    Policies {
        /// Resource kind (container, service, network, volume); all if omitted.
        kind: Option<String>,
    },

    /// Manage the snapshot backend.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Snapshot management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show the snapshot.
    Show,

    /// Lock the snapshot.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the snapshot.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Force unlock (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "docker-converge",
            "--config",
            "converge.yaml",
            "apply",
            "--yes",
            "--continue-on-error",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("converge.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Apply {
                yes: true,
                continue_on_error: true
            }
        ));
    }

    #[test]
    fn test_parse_policies_and_output() {
        let cli = Cli::try_parse_from(["docker-converge", "policies", "container", "--output", "json"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Policies { kind: Some(ref k) } if k == "container"));
    }
}
