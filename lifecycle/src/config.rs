//! Configuration loading and default template generation.
//!
//! ```toml
//! # OS signals that terminate the lifecycle.
//! signals = ["SIGTERM", "SIGINT"]
//!
//! # Optional hard deadline, in seconds, after which the lifecycle ends.
//! deadline_secs = 3600
//!
//! # Log filter used when RUST_LOG is not set.
//! log_level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::signal::Signal;
use crate::token::LifecycleOptions;

/// Lifecycle configuration as read from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    signals: Vec<Signal>,
    deadline_secs: Option<u64>,
    log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signals: vec![Signal::Terminate, Signal::Interrupt],
            deadline_secs: None,
            log_level: None,
        }
    }
}

impl Config {
    /// Signals that terminate the lifecycle.
    #[must_use]
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Hard deadline for the lifecycle, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    /// Builds [`LifecycleOptions`] deriving the lifecycle context from `base`.
    #[must_use]
    pub fn options(&self, base: CancellationToken) -> LifecycleOptions {
        let options = LifecycleOptions::new()
            .with_base(base)
            .with_signals(self.signals.iter().copied());
        match self.deadline() {
            Some(deadline) => options.with_deadline(deadline),
            None => options,
        }
    }
}

/// Parses configuration from a TOML string.
///
/// # Errors
///
/// Returns [`Error::Config`] if the content is not valid configuration.
pub fn parse_config(content: &str) -> Result<Config, Error> {
    toml::from_str(content).map_err(|e| Error::config(format!("failed to parse TOML config: {e}")))
}

/// Load configuration from a TOML file at the given path.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be resolved, read, or parsed.
pub fn load_config(path: &Path) -> Result<Config, Error> {
    let config_path = path.canonicalize().map_err(|e| {
        Error::config(format!(
            "failed to resolve config path '{}': {e}",
            path.display()
        ))
    })?;
    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        Error::config(format!(
            "failed to read config file '{}': {e}",
            config_path.display()
        ))
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::config(format!(
            "failed to parse TOML config '{}': {e}",
            config_path.display()
        ))
    })
}

/// Generate a default TOML configuration template.
#[must_use]
pub fn generate_default_config() -> String {
    String::from(
        r#"# Lifecycle configuration

# OS signals that terminate the lifecycle.
# Accepted: SIGTERM, SIGINT, SIGHUP, SIGQUIT, SIGUSR1, SIGUSR2
signals = ["SIGTERM", "SIGINT"]

# Hard deadline in seconds after which the lifecycle ends on its own.
# deadline_secs = 3600

# Log filter used when RUST_LOG is not set.
log_level = "info"
"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let config = parse_config(&generate_default_config()).unwrap();
        assert_eq!(config.signals(), &[Signal::Terminate, Signal::Interrupt]);
        assert_eq!(config.deadline(), None);
        assert_eq!(config.log_level(), Some("info"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(parse_config("").unwrap(), Config::default());
    }

    #[test]
    fn custom_values() {
        let config = parse_config(
            r#"
            signals = ["hup", "SIGUSR2"]
            deadline_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.signals(), &[Signal::Hangup, Signal::User2]);
        assert_eq!(config.deadline(), Some(Duration::from_secs(5)));
        assert_eq!(config.log_level(), None);
    }

    #[test]
    fn no_signals_is_allowed() {
        let config = parse_config("signals = []").unwrap();
        assert!(config.signals().is_empty());
    }

    #[test]
    fn rejects_unknown_signal_and_fields() {
        assert!(matches!(
            parse_config(r#"signals = ["SIGKILL"]"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(parse_config("port = 80"), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Path::new("/nonexistent/lifecycle.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to resolve config path"));
    }
}
