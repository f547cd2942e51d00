//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Lifecycle host: waits for a termination signal and drains shutdown handlers.
#[derive(Debug, Parser)]
#[command(name = "lifecycle")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a default TOML configuration file.
    Init {
        /// Output path for the configuration file.
        #[arg(short, long, default_value = "lifecycle.toml")]
        output: PathBuf,

        /// Overwrite the file if it already exists.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Run until the lifecycle terminates.
    Run {
        /// Path to the TOML configuration file. Defaults apply if it is missing.
        #[arg(short, long, env = "LIFECYCLE_CONFIG", default_value = "lifecycle.toml")]
        config: PathBuf,

        /// Override the configured deadline, in seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
}
