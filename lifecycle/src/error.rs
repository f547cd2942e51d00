//! Unified error types for the lifecycle crate.
//!
//! Runtime operations on a [`LifecycleToken`](crate::LifecycleToken) never
//! fail. Errors only surface while building a coordinator or loading its
//! configuration.

use thiserror::Error;

use crate::signal::Signal;

/// Top-level error type for the lifecycle crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A coordinator was built outside of a tokio runtime.
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,

    /// The operating system refused a signal subscription.
    #[error("failed to subscribe to {signal}: {source}")]
    Signal {
        /// Signal that could not be subscribed to.
        signal: Signal,
        /// Underlying I/O error reported by the runtime.
        #[source]
        source: std::io::Error,
    },

    /// The signal cannot be observed on this platform.
    #[error("{0} is not supported on this platform")]
    UnsupportedSignal(Signal),

    /// Configuration file could not be resolved, read, or parsed.
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Builds an [`Error::Config`] from a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
