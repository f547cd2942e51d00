//! Recording test double for [`LifecycleManager`].
//!
//! [`MockLifecycleManager`] never terminates on its own. It records every
//! call so tests of code that takes a `&dyn LifecycleManager` can assert on
//! how the lifecycle was used, and runs the captured handlers on demand.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::token::{LifecycleManager, ShutdownHandler};

#[derive(Debug, Default, Clone, Copy)]
struct Expectations {
    registrations: Option<usize>,
    terminations: Option<usize>,
    context_requests: Option<usize>,
}

/// [`LifecycleManager`] that records calls instead of coordinating shutdown.
#[derive(Default)]
pub struct MockLifecycleManager {
    context: CancellationToken,
    handlers: Mutex<Vec<ShutdownHandler>>,
    registrations: AtomicUsize,
    terminations: AtomicUsize,
    context_requests: AtomicUsize,
    expectations: Mutex<Expectations>,
}

impl MockLifecycleManager {
    /// Creates a mock with a fresh, uncancelled context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock whose [`LifecycleManager::context`] returns `context`.
    #[must_use]
    pub fn with_context(context: CancellationToken) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Number of [`LifecycleManager::register_shutdown_handler`] calls.
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Number of [`LifecycleManager::terminate_lifecycle`] calls.
    #[must_use]
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Number of [`LifecycleManager::context`] calls.
    #[must_use]
    pub fn context_requests(&self) -> usize {
        self.context_requests.load(Ordering::SeqCst)
    }

    /// Cancels the context and runs every captured handler in registration
    /// order, returning how many ran.
    pub fn run_handlers(&self) -> usize {
        self.context.cancel();
        let handlers = std::mem::take(
            &mut *self.handlers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = handlers.len();
        for handler in handlers {
            handler(&self.context);
        }
        count
    }

    /// Expects exactly `count` handler registrations by [`verify`](Self::verify).
    pub fn expect_registrations(&self, count: usize) -> &Self {
        self.expect(|e| e.registrations = Some(count))
    }

    /// Expects exactly `count` termination requests by [`verify`](Self::verify).
    pub fn expect_terminations(&self, count: usize) -> &Self {
        self.expect(|e| e.terminations = Some(count))
    }

    /// Expects exactly `count` context requests by [`verify`](Self::verify).
    pub fn expect_context_requests(&self, count: usize) -> &Self {
        self.expect(|e| e.context_requests = Some(count))
    }

    fn expect(&self, set: impl FnOnce(&mut Expectations)) -> &Self {
        set(&mut self.expectations.lock().unwrap_or_else(PoisonError::into_inner));
        self
    }

    /// Asserts that every expectation set so far was met.
    ///
    /// # Panics
    ///
    /// Panics listing each call count that differs from its expectation.
    #[allow(clippy::panic)]
    pub fn verify(&self) {
        let expectations = *self.expectations.lock().unwrap_or_else(PoisonError::into_inner);
        let checks = [
            ("register_shutdown_handler", expectations.registrations, self.registrations()),
            ("terminate_lifecycle", expectations.terminations, self.terminations()),
            ("context", expectations.context_requests, self.context_requests()),
        ];
        let failures: Vec<String> = checks
            .iter()
            .filter_map(|&(call, expected, actual)| {
                expected
                    .filter(|&expected| expected != actual)
                    .map(|expected| format!("{call}: expected {expected} call(s), got {actual}"))
            })
            .collect();
        if !failures.is_empty() {
            panic!("unmet lifecycle expectations: {}", failures.join("; "));
        }
    }
}

impl LifecycleManager for MockLifecycleManager {
    fn register_shutdown_handler(&self, handler: ShutdownHandler) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    fn terminate_lifecycle(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }

    fn context(&self) -> &CancellationToken {
        self.context_requests.fetch_add(1, Ordering::SeqCst);
        &self.context
    }
}

impl fmt::Debug for MockLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLifecycleManager")
            .field("registrations", &self.registrations())
            .field("terminations", &self.terminations())
            .field("context_requests", &self.context_requests())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;

    /// A worker written against the trait, as production code would be.
    fn start_worker(lifecycle: &dyn LifecycleManager, stopped: Arc<AtomicBool>) -> CancellationToken {
        let scope = lifecycle.context().child_token();
        lifecycle.register_shutdown_handler(Box::new(move |ctx: &CancellationToken| {
            stopped.store(ctx.is_cancelled(), Ordering::SeqCst);
        }));
        scope
    }

    #[test]
    fn records_calls() {
        let mock = MockLifecycleManager::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let scope = start_worker(&mock, Arc::clone(&stopped));
        mock.terminate_lifecycle();

        mock.expect_registrations(1)
            .expect_terminations(1)
            .expect_context_requests(1)
            .verify();
        assert!(!scope.is_cancelled());
        assert!(!stopped.load(Ordering::SeqCst));

        assert_eq!(mock.run_handlers(), 1);
        assert!(scope.is_cancelled());
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(mock.run_handlers(), 0);
    }

    #[test]
    #[should_panic(expected = "terminate_lifecycle: expected 1 call(s), got 0")]
    fn verify_reports_unmet_expectations() {
        let mock = MockLifecycleManager::new();
        mock.expect_terminations(1).verify();
    }

    #[test]
    fn shares_supplied_context() {
        let context = CancellationToken::new();
        let mock = MockLifecycleManager::with_context(context.clone());
        context.cancel();
        assert!(mock.context().is_cancelled());
    }
}
