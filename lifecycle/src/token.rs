//! The lifecycle coordinator.
//!
//! A [`LifecycleToken`] owns a [`CancellationToken`] derived from a caller
//! supplied base token, a list of pending [`ShutdownHandler`]s and a single
//! background watcher. The watcher waits for the first of:
//!
//! - a subscribed OS [`Signal`],
//! - a call to [`LifecycleToken::terminate_lifecycle`],
//! - cancellation of the base token,
//! - the optional deadline,
//!
//! then cancels the context and runs every registered handler exactly once.
//! Handlers registered after that point run immediately in the registering
//! task.
//!
//! Most applications share one coordinator per process through
//! [`lifecycle_token`]; [`LifecycleToken::try_new`] builds an independent one
//! for explicit injection.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::Error;
use crate::signal::{self, Signal, TerminationCause, Trigger};

/// Callback run once when the lifecycle terminates.
///
/// The argument is the coordinator's context, already cancelled.
pub type ShutdownHandler = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

/// Lifecycle operations needed by workers, for dependency injection.
///
/// Implemented by [`LifecycleToken`] and, with the `mock` feature, by
/// [`MockLifecycleManager`](crate::mock::MockLifecycleManager).
pub trait LifecycleManager: Send + Sync {
    /// Registers `handler` to run when the lifecycle terminates.
    fn register_shutdown_handler(&self, handler: ShutdownHandler);

    /// Requests termination of the lifecycle.
    fn terminate_lifecycle(&self);

    /// Returns the lifecycle's cancellation context.
    fn context(&self) -> &CancellationToken;
}

/// Construction parameters for a [`LifecycleToken`].
#[derive(Debug, Clone, Default)]
pub struct LifecycleOptions {
    base: CancellationToken,
    signals: Vec<Signal>,
    deadline: Option<Duration>,
}

impl LifecycleOptions {
    /// Options with a fresh base token, no signals and no deadline.
    ///
    /// A lifecycle built from these only ends through
    /// [`LifecycleToken::terminate_lifecycle`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the lifecycle context from `base`. Cancelling `base`
    /// terminates the lifecycle.
    #[must_use]
    pub fn with_base(mut self, base: CancellationToken) -> Self {
        self.base = base;
        self
    }

    /// Sets the OS signals that terminate the lifecycle.
    #[must_use]
    pub fn with_signals(mut self, signals: impl IntoIterator<Item = Signal>) -> Self {
        self.signals = signals.into_iter().collect();
        self
    }

    /// Terminates the lifecycle once `deadline` has elapsed after construction.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

struct State {
    alive: bool,
    handlers: Vec<ShutdownHandler>,
}

struct Inner {
    context: CancellationToken,
    triggers: mpsc::Sender<Trigger>,
    state: Mutex<State>,
    // Mirrors `State::alive` for readers that must not wait on a drain.
    alive: AtomicBool,
    cause: OnceLock<TerminationCause>,
    tasks: TaskTracker,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, handler: ShutdownHandler) {
        let mut state = self.lock_state();
        if state.alive {
            state.handlers.push(handler);
            return;
        }
        drop(state);

        tracing::debug!("lifecycle already terminated, running shutdown handler immediately");
        run_handler(handler, &self.context);
    }

    /// Flips `alive` and runs every pending handler while holding the lock,
    /// so concurrent registrations wait for the drain to finish.
    fn drain(&self) -> usize {
        let mut state = self.lock_state();
        state.alive = false;
        self.alive.store(false, Ordering::SeqCst);
        let handlers = std::mem::take(&mut state.handlers);
        let count = handlers.len();
        for handler in handlers {
            run_handler(handler, &self.context);
        }
        count
    }
}

fn run_handler(handler: ShutdownHandler, context: &CancellationToken) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(context))) {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        tracing::error!(panic = message, "shutdown handler panicked");
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Cancels the context and drains the handlers when the watcher ends.
///
/// Passed to [`watch`] by value so it also fires when the watcher future is
/// dropped unpolled or mid-wait, e.g. on runtime shutdown.
struct DrainOnExit {
    inner: Arc<Inner>,
}

impl Drop for DrainOnExit {
    fn drop(&mut self) {
        if self.inner.cause.set(TerminationCause::Abandoned).is_ok() {
            tracing::warn!(cause = %TerminationCause::Abandoned, "non-graceful shutdown detected");
        }
        self.inner.context.cancel();
        let handlers = self.inner.drain();
        tracing::info!(handlers, "lifecycle complete");
    }
}

/// Watcher body: waits for the first trigger, then lets `exit` cancel the
/// context and drain.
async fn watch(exit: DrainOnExit, mut triggers: mpsc::Receiver<Trigger>, deadline: Option<Instant>) {
    let inner = &exit.inner;
    let cause = tokio::select! {
        Some(trigger) = triggers.recv() => TerminationCause::from(trigger),
        () = inner.context.cancelled() => TerminationCause::Cancelled,
        () = deadline_elapsed(deadline) => TerminationCause::DeadlineElapsed,
    };
    drop(triggers);

    let _ = inner.cause.set(cause);
    if cause.is_graceful() {
        tracing::info!(%cause, "termination requested");
    } else {
        tracing::warn!(%cause, "non-graceful shutdown detected");
    }
    drop(exit);
}

/// Handle to a lifecycle coordinator.
///
/// Cloning is cheap; all clones refer to the same lifecycle and compare equal.
#[derive(Clone)]
pub struct LifecycleToken {
    inner: Arc<Inner>,
}

impl LifecycleToken {
    /// Builds an independent lifecycle and spawns its watcher on the current
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] when called outside a tokio runtime, and
    /// [`Error::Signal`] or [`Error::UnsupportedSignal`] when a requested
    /// signal cannot be subscribed to.
    pub fn try_new(options: LifecycleOptions) -> Result<Self, Error> {
        tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let LifecycleOptions {
            base,
            signals,
            deadline,
        } = options;

        let context = base.child_token();
        let (triggers, receiver) = mpsc::channel(1);
        let tasks = TaskTracker::new();

        let mut subscribed = Vec::with_capacity(signals.len());
        for sig in signals {
            if subscribed.contains(&sig) {
                continue;
            }
            if let Err(err) = signal::subscribe(sig, triggers.clone(), context.clone(), &tasks) {
                // Release the forwarders spawned so far.
                context.cancel();
                tasks.close();
                return Err(err);
            }
            subscribed.push(sig);
        }

        let inner = Arc::new(Inner {
            context,
            triggers,
            state: Mutex::new(State {
                alive: true,
                handlers: Vec::new(),
            }),
            alive: AtomicBool::new(true),
            cause: OnceLock::new(),
            tasks,
        });

        // A deadline past the clock's range never elapses.
        let deadline = deadline.and_then(|after| Instant::now().checked_add(after));
        let exit = DrainOnExit {
            inner: Arc::clone(&inner),
        };
        inner.tasks.spawn(watch(exit, receiver, deadline));
        inner.tasks.close();

        tracing::debug!(signals = ?subscribed, ?deadline, "lifecycle started");
        Ok(Self { inner })
    }

    /// Registers `handler` to run when the lifecycle terminates.
    ///
    /// If termination has already happened, `handler` runs right away on the
    /// calling task, before this method returns. A handler that panics is
    /// logged and does not affect other handlers.
    ///
    /// Handlers run while the handler list is locked and must not register
    /// further handlers themselves. [`is_alive`](Self::is_alive),
    /// [`context`](Self::context), [`termination_cause`](Self::termination_cause)
    /// and `Debug` stay usable from inside a handler.
    pub fn register_shutdown_handler<F>(&self, handler: F)
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        self.inner.register(Box::new(handler));
    }

    /// Requests termination of the lifecycle.
    ///
    /// Never blocks. If a termination trigger is already pending, or the
    /// lifecycle has already terminated, the request is dropped.
    pub fn terminate_lifecycle(&self) {
        signal::send_trigger(&self.inner.triggers, Trigger::Manual);
    }

    /// Returns the lifecycle's cancellation context.
    ///
    /// The token is cancelled before any shutdown handler runs. Use
    /// [`CancellationToken::child_token`] to derive scoped tokens.
    #[must_use]
    pub fn context(&self) -> &CancellationToken {
        &self.inner.context
    }

    /// Whether the lifecycle is still accepting deferred handlers.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Whether every handler has run and the watcher has exited.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.tasks.is_empty()
    }

    /// What ended the lifecycle, once it has ended.
    #[must_use]
    pub fn termination_cause(&self) -> Option<TerminationCause> {
        self.inner.cause.get().copied()
    }

    /// Waits until the lifecycle has terminated and every pending handler has
    /// run.
    pub async fn terminated(&self) {
        self.inner.tasks.wait().await;
    }

    #[cfg(test)]
    fn task_count(&self) -> usize {
        self.inner.tasks.len()
    }
}

impl LifecycleManager for LifecycleToken {
    fn register_shutdown_handler(&self, handler: ShutdownHandler) {
        self.inner.register(handler);
    }

    fn terminate_lifecycle(&self) {
        Self::terminate_lifecycle(self);
    }

    fn context(&self) -> &CancellationToken {
        Self::context(self)
    }
}

impl PartialEq for LifecycleToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for LifecycleToken {}

impl fmt::Debug for LifecycleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `None` while a drain holds the lock.
        let pending = match self.inner.state.try_lock() {
            Ok(state) => Some(state.handlers.len()),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner().handlers.len()),
            Err(TryLockError::WouldBlock) => None,
        };
        f.debug_struct("LifecycleToken")
            .field("alive", &self.is_alive())
            .field("pending_handlers", &pending)
            .field("cause", &self.termination_cause())
            .finish_non_exhaustive()
    }
}

static GLOBAL: Mutex<Option<LifecycleToken>> = Mutex::new(None);

/// Returns the process-wide lifecycle, building it from `options` on first
/// use.
///
/// Later calls return the same lifecycle and ignore their `options`.
/// Concurrent first calls are serialized; exactly one of them builds. The
/// watcher runs on the runtime of the call that built the lifecycle.
///
/// # Errors
///
/// Returns the construction error of [`LifecycleToken::try_new`]. A failed
/// construction leaves the slot empty so a later call can retry.
pub fn lifecycle_token(options: LifecycleOptions) -> Result<LifecycleToken, Error> {
    let mut global = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(token) = global.as_ref() {
        return Ok(token.clone());
    }

    let token = LifecycleToken::try_new(options)?;
    *global = Some(token.clone());
    Ok(token)
}

/// Returns the process-wide lifecycle, building it on first use with a fresh
/// base token and [`Signal::Terminate`] as the only termination signal.
///
/// # Errors
///
/// See [`lifecycle_token`].
pub fn default_lifecycle_token() -> Result<LifecycleToken, Error> {
    lifecycle_token(LifecycleOptions::new().with_signals([Signal::Terminate]))
}
