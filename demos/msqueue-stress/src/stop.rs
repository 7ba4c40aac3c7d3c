use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A cloneable token that asks workers to stop.
///
/// Workers check it between operations and sleep through it, so a
/// cancellation also cuts any pending pause short.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let Inner {
            cancelled,
            lock,
            cvar,
        } = &*self.0;
        // Hold the lock so that no sleeper misses the wakeup between its check
        // and its wait.
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        cancelled.store(true, Ordering::Release);
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Sleeps for `dur` unless cancelled, returning whether this token has
    /// been cancelled. A zero `dur` only yields the current thread.
    pub fn sleep(&self, dur: Duration) -> bool {
        if dur.is_zero() {
            std::thread::yield_now();
            return self.is_cancelled();
        }

        let Inner {
            cancelled,
            lock,
            cvar,
        } = &*self.0;
        let deadline = Instant::now() + dur;
        let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if cancelled.load(Ordering::Acquire) {
                return true;
            }
            // Spurious wakeups simply resume the wait.
            let Some(timeout) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            guard = cvar
                .wait_timeout(guard, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
