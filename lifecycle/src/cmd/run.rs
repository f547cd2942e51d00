//! `lifecycle run` command — host the process-wide lifecycle until it ends.
//!
//! Reads TOML configuration, builds the lifecycle with the configured
//! signals and deadline, then waits until every shutdown handler has run.

use std::path::Path;
use std::time::Duration;

use dotenvy::dotenv;
use lifecycle::config::{Config, load_config};
use lifecycle::{Error, lifecycle_token};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "telemetry")]
use crate::telemetry::Telemetry;

/// Execute the `run` command.
///
/// # Errors
///
/// Returns an error if an existing configuration file cannot be loaded or
/// the lifecycle cannot subscribe to its signals.
pub async fn run(config_path: &Path, deadline_secs: Option<u64>) -> Result<(), Error> {
    dotenv().ok();

    let found = config_path.exists();
    let config = if found {
        load_config(config_path)?
    } else {
        Config::default()
    };

    #[cfg(feature = "telemetry")]
    {
        let telemetry = Telemetry::new();
        let telemetry = match config.log_level() {
            Some(level) => telemetry.with_log_level(level),
            None => telemetry,
        };
        telemetry.register();
    }

    if !found {
        tracing::info!(path = %config_path.display(), "config file not found, using defaults");
    }

    let mut options = config.options(CancellationToken::new());
    if let Some(secs) = deadline_secs {
        options = options.with_deadline(Duration::from_secs(secs));
    }
    let lifecycle = lifecycle_token(options)?;

    let started = tokio::time::Instant::now();
    lifecycle.register_shutdown_handler(move |_| {
        tracing::info!(uptime = ?started.elapsed(), "shutting down");
    });

    tracing::info!(signals = ?config.signals(), "waiting for termination");
    lifecycle.terminated().await;

    if let Some(cause) = lifecycle.termination_cause() {
        tracing::info!(%cause, "lifecycle ended");
    }
    Ok(())
}
