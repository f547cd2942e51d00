//! Termination through real OS signals.
//!
//! Each test listens on a signal no other test in this binary uses, since a
//! delivered signal reaches every subscriber in the process.
#![cfg(unix)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lifecycle::{LifecycleOptions, LifecycleToken, Signal, TerminationCause};
use tokio::time::timeout;

const BOUND: Duration = Duration::from_secs(2);

#[allow(unsafe_code)]
fn raise(signal: libc::c_int) {
    let result = unsafe { libc::raise(signal) };
    assert_eq!(result, 0, "raise failed");
}

fn counting_handler(token: &LifecycleToken) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    token.register_shutdown_handler(move |ctx| {
        assert!(ctx.is_cancelled());
        c.fetch_add(1, Ordering::SeqCst);
    });
    calls
}

#[tokio::test]
async fn signal_terminates_lifecycle() {
    let token =
        LifecycleToken::try_new(LifecycleOptions::new().with_signals([Signal::User1])).unwrap();
    let calls = counting_handler(&token);

    raise(libc::SIGUSR1);
    timeout(BOUND, token.terminated()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        token.termination_cause(),
        Some(TerminationCause::Signal(Signal::User1))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signal_and_manual_trigger_race_drains_once() {
    let token =
        LifecycleToken::try_new(LifecycleOptions::new().with_signals([Signal::User2])).unwrap();
    let calls = counting_handler(&token);

    let manual = {
        let token = token.clone();
        tokio::spawn(async move { token.terminate_lifecycle() })
    };
    raise(libc::SIGUSR2);
    token.terminate_lifecycle();
    manual.await.unwrap();

    timeout(BOUND, token.terminated()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        token.termination_cause(),
        Some(TerminationCause::Signal(Signal::User2) | TerminationCause::Manual)
    ));
}

#[tokio::test]
async fn signals_after_termination_are_ignored() {
    let token = LifecycleToken::try_new(
        LifecycleOptions::new().with_signals([Signal::Hangup, Signal::Hangup]),
    )
    .unwrap();
    let calls = counting_handler(&token);

    token.terminate_lifecycle();
    timeout(BOUND, token.terminated()).await.unwrap();

    raise(libc::SIGHUP);
    token.terminate_lifecycle();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(token.termination_cause(), Some(TerminationCause::Manual));
}
