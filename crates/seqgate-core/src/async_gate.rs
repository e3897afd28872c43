//! Async sequence gate for tokio tasks.
//!
//! Same contract as [`CountingGate`](crate::CountingGate), but waiters are
//! futures. Cancellation is native: dropping an acquire future abandons the
//! wait and removes the waiter from the count.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::watch;

struct AsyncShared {
    state: watch::Sender<u64>,
    waiters: AtomicUsize,
}

/// Async counterpart of [`CountingGate`](crate::CountingGate).
///
/// Cloning yields another handle to the same gate.
#[derive(Clone)]
pub struct AsyncCountingGate {
    shared: Arc<AsyncShared>,
}

/// Counts a suspended waiter for as long as its future is alive.
struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn enter(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        Self(waiters)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncCountingGate {
    /// Create a gate with state 0.
    pub fn new() -> Self {
        Self::with_state(0)
    }

    /// Create a gate starting at `state`.
    pub fn with_state(state: u64) -> Self {
        let (state, _) = watch::channel(state);
        Self { shared: Arc::new(AsyncShared { state, waiters: AtomicUsize::new(0) }) }
    }

    /// Wait until the counter reaches `threshold` or `timeout` elapses.
    ///
    /// Returns `true` if the threshold was reached, `false` on timeout. A
    /// zero timeout probes without suspending.
    pub async fn acquire(&self, threshold: u64, timeout: Duration) -> bool {
        if self.try_acquire(threshold) {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }

        let mut rx = self.shared.state.subscribe();
        let _waiter = WaiterGuard::enter(&self.shared.waiters);

        match tokio::time::timeout(timeout, rx.wait_for(|state| *state >= threshold)).await {
            Ok(Ok(_)) => true,
            // The sender lives in `shared`, which `self` keeps alive.
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::debug!(threshold, state = self.state(), ?timeout, "acquire timed out");
                false
            },
        }
    }

    /// Check the counter against `threshold` without suspending.
    pub fn try_acquire(&self, threshold: u64) -> bool {
        *self.shared.state.borrow() >= threshold
    }

    /// Advance the counter to `max(state, new_state)` and wake waiters.
    pub fn release(&self, new_state: u64) {
        let advanced = self.shared.state.send_if_modified(|state| {
            if new_state > *state {
                *state = new_state;
                true
            } else {
                false
            }
        });

        if advanced {
            tracing::trace!(state = new_state, waiters = self.waiter_count(), "gate released");
        } else {
            tracing::trace!(requested = new_state, "release clamped");
        }
    }

    /// Increment the counter by one, wake waiters and return the new value.
    ///
    /// Saturates at `u64::MAX`.
    pub fn advance(&self) -> u64 {
        let mut next = 0;
        self.shared.state.send_if_modified(|state| {
            next = state.saturating_add(1);
            let changed = next != *state;
            *state = next;
            changed
        });
        tracing::trace!(state = next, "gate advanced");
        next
    }

    /// Current counter value. Advisory.
    pub fn state(&self) -> u64 {
        *self.shared.state.borrow()
    }

    /// Whether any task is suspended in [`acquire`](Self::acquire).
    /// Advisory.
    pub fn has_waiters(&self) -> bool {
        self.waiter_count() > 0
    }

    /// Number of tasks suspended in [`acquire`](Self::acquire). Advisory.
    pub fn waiter_count(&self) -> usize {
        self.shared.waiters.load(Ordering::SeqCst)
    }
}

impl Default for AsyncCountingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AsyncCountingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCountingGate")
            .field("state", &self.state())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}
