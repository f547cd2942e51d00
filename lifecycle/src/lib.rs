//! Process-wide graceful shutdown coordination.
//!
//! A [`LifecycleToken`] is the single place where independent workers
//! register cleanup callbacks and obtain a shared [`CancellationToken`].
//! The first of an OS signal, a call to
//! [`terminate_lifecycle`](LifecycleToken::terminate_lifecycle), cancellation
//! of the base token or an optional deadline ends the lifecycle: the context is
//! cancelled, then every registered handler runs exactly once.
//!
//! ```no_run
//! # async fn demo() -> Result<(), lifecycle::Error> {
//! use lifecycle::{LifecycleOptions, Signal, lifecycle_token};
//!
//! let lifecycle = lifecycle_token(
//!     LifecycleOptions::new().with_signals([Signal::Terminate, Signal::Interrupt]),
//! )?;
//!
//! let ctx = lifecycle.context().clone();
//! tokio::spawn(async move {
//!     ctx.cancelled().await;
//!     // stop accepting work
//! });
//! lifecycle.register_shutdown_handler(|_ctx| {
//!     // flush buffers
//! });
//!
//! lifecycle.terminated().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod signal;
mod token;

pub use error::Error;
pub use signal::{ParseSignalError, Signal, TerminationCause, Trigger};
pub use token::{
    LifecycleManager, LifecycleOptions, LifecycleToken, ShutdownHandler, default_lifecycle_token,
    lifecycle_token,
};
pub use tokio_util::sync::CancellationToken;
