//! Lifecycle host
//!
//! Runs the process-wide lifecycle coordinator until a termination signal,
//! deadline or upstream cancellation ends it.
//!
//! ```sh
//! lifecycle init            # Generate default lifecycle.toml
//! lifecycle run             # Wait for SIGTERM / SIGINT
//! ```

mod cli;
mod cmd;
#[cfg(feature = "telemetry")]
mod telemetry;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { output, force } => cmd::init::run(&output, force),
        Commands::Run {
            config,
            deadline_secs,
        } => cmd::run::run(&config, deadline_secs).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
