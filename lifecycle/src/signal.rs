//! Termination signal handling.
//!
//! [`Signal`] names the OS signals a [`LifecycleToken`](crate::LifecycleToken)
//! can listen for (SIGTERM/SIGINT/SIGHUP/SIGQUIT/SIGUSR1/SIGUSR2 on Unix,
//! Ctrl+C on Windows). Each subscribed signal gets a small forwarder task that
//! turns the first delivery into a [`Trigger`] on the coordinator's trigger
//! channel. Manual termination travels the same channel as
//! [`Trigger::Manual`], so the watcher can tell the two causes apart.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
#[cfg(unix)]
use tokio::signal::unix::SignalKind;
#[cfg(unix)]
use tokio::signal::unix::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::Error;

/// OS signal that can terminate a lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Signal {
    /// `SIGTERM`, the conventional "please terminate" request.
    Terminate,
    /// `SIGINT` (Ctrl+C).
    Interrupt,
    /// `SIGHUP`.
    Hangup,
    /// `SIGQUIT`.
    Quit,
    /// `SIGUSR1`.
    User1,
    /// `SIGUSR2`.
    User2,
}

impl Signal {
    /// Every signal known to this crate.
    pub const ALL: [Self; 6] = [
        Self::Terminate,
        Self::Interrupt,
        Self::Hangup,
        Self::Quit,
        Self::User1,
        Self::User2,
    ];

    /// Conventional `SIG*` name of the signal.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "SIGINT",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
            Self::User1 => "SIGUSR1",
            Self::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(self) -> SignalKind {
        match self {
            Self::Terminate => SignalKind::terminate(),
            Self::Interrupt => SignalKind::interrupt(),
            Self::Hangup => SignalKind::hangup(),
            Self::Quit => SignalKind::quit(),
            Self::User1 => SignalKind::user_defined1(),
            Self::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string does not name a known [`Signal`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal '{0}'")]
pub struct ParseSignalError(String);

impl FromStr for Signal {
    type Err = ParseSignalError;

    /// Accepts `SIGTERM`, `TERM` or `terminate` style names, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        match bare {
            "TERM" | "TERMINATE" => Ok(Self::Terminate),
            "INT" | "INTERRUPT" => Ok(Self::Interrupt),
            "HUP" | "HANGUP" => Ok(Self::Hangup),
            "QUIT" => Ok(Self::Quit),
            "USR1" | "USER1" => Ok(Self::User1),
            "USR2" | "USER2" => Ok(Self::User2),
            _ => Err(ParseSignalError(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Signal {
    type Error = ParseSignalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Value carried on the trigger channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// An OS signal was delivered.
    Signal(Signal),
    /// [`LifecycleToken::terminate_lifecycle`](crate::LifecycleToken::terminate_lifecycle) was called.
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::Manual => f.write_str("manual termination"),
        }
    }
}

/// Why a lifecycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// An OS signal was delivered.
    Signal(Signal),
    /// Termination was requested programmatically.
    Manual,
    /// The base cancellation token was cancelled.
    Cancelled,
    /// The configured deadline elapsed.
    DeadlineElapsed,
    /// The watcher was dropped before any trigger arrived, e.g. because its
    /// runtime shut down.
    Abandoned,
}

impl TerminationCause {
    /// Whether the lifecycle ended through a trigger rather than an upstream
    /// cancellation or deadline.
    #[must_use]
    pub const fn is_graceful(self) -> bool {
        matches!(self, Self::Signal(_) | Self::Manual)
    }
}

impl From<Trigger> for TerminationCause {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Signal(signal) => Self::Signal(signal),
            Trigger::Manual => Self::Manual,
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::Manual => f.write_str("manual termination"),
            Self::Cancelled => f.write_str("context cancelled"),
            Self::DeadlineElapsed => f.write_str("deadline elapsed"),
            Self::Abandoned => f.write_str("watcher dropped"),
        }
    }
}

/// Offers a trigger to the watcher without blocking.
///
/// The channel holds a single pending trigger and the watcher reads exactly
/// one, so the first trigger wins. Returns `false` when the trigger was
/// dropped.
pub(crate) fn send_trigger(triggers: &mpsc::Sender<Trigger>, trigger: Trigger) -> bool {
    match triggers.try_send(trigger) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            tracing::debug!(trigger = %dropped, "termination already pending, trigger dropped");
            false
        }
        Err(TrySendError::Closed(dropped)) => {
            tracing::debug!(trigger = %dropped, "lifecycle already terminated, trigger dropped");
            false
        }
    }
}

/// Subscribes to `signal` and spawns a forwarder on `tasks`.
///
/// The forwarder delivers the first occurrence of the signal as
/// [`Trigger::Signal`] and exits, or exits silently once `context` is
/// cancelled.
///
/// # Errors
///
/// Returns [`Error::Signal`] if the runtime cannot install the handler, or
/// [`Error::UnsupportedSignal`] if the platform cannot observe the signal.
pub(crate) fn subscribe(
    signal_to_watch: Signal,
    triggers: mpsc::Sender<Trigger>,
    context: CancellationToken,
    tasks: &TaskTracker,
) -> Result<(), Error> {
    #[cfg(unix)]
    {
        let mut stream = signal(signal_to_watch.kind()).map_err(|source| Error::Signal {
            signal: signal_to_watch,
            source,
        })?;
        tasks.spawn(async move {
            tokio::select! {
                () = context.cancelled() => {},
                received = stream.recv() => {
                    if received.is_some() {
                        send_trigger(&triggers, Trigger::Signal(signal_to_watch));
                    }
                }
            }
        });
    }

    #[cfg(windows)]
    {
        if signal_to_watch != Signal::Interrupt {
            return Err(Error::UnsupportedSignal(signal_to_watch));
        }
        tasks.spawn(async move {
            tokio::select! {
                () = context.cancelled() => {},
                received = tokio::signal::ctrl_c() => {
                    if received.is_ok() {
                        send_trigger(&triggers, Trigger::Signal(signal_to_watch));
                    }
                }
            }
        });
    }

    Ok(())
}
