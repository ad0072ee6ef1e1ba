//! Bounded waits on calls that cross the external boundary.
//!
//! Content lookups and pull refreshes talk to collaborators that may hang.
//! [`call_with_timeout`] runs the call on a helper thread and waits at most
//! the given duration. A call that overruns keeps running detached; its
//! result is discarded when it finally arrives.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BoundedError {
    #[error("call did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("failed to spawn helper thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("call panicked before producing a result")]
    Panicked,
}

/// Run `f` and wait up to `timeout` for its result.
///
/// # Errors
///
/// Returns [`BoundedError::TimedOut`] if `f` overruns, or
/// [`BoundedError::Panicked`] if it unwinds.
pub fn call_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T, BoundedError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("arbor-bounded-call".to_string())
        .spawn(move || {
            // The receiver is gone if the caller already gave up.
            let _ = tx.send(f());
        })?;

    rx.recv_timeout(timeout).map_err(|e| match e {
        mpsc::RecvTimeoutError::Timeout => BoundedError::TimedOut(timeout),
        mpsc::RecvTimeoutError::Disconnected => BoundedError::Panicked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_call_returns_value() {
        let got = call_with_timeout(Duration::from_secs(1), || 7).expect("fast call");
        assert_eq!(got, 7);
    }

    #[test]
    fn slow_call_times_out() {
        let err = call_with_timeout(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            7
        })
        .unwrap_err();
        assert!(matches!(err, BoundedError::TimedOut(_)));
    }

    #[test]
    fn panicking_call_is_reported() {
        let err =
            call_with_timeout(Duration::from_secs(1), || -> u8 { panic!("boom") }).unwrap_err();
        assert!(matches!(err, BoundedError::Panicked));
    }
}
