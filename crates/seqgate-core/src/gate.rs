//! Blocking sequence gate.
//!
//! A [`CountingGate`] holds a monotonically non-decreasing `u64` counter.
//! Waiters block until the counter reaches their threshold; releasers
//! advance the counter and wake everyone, and each waiter re-checks its own
//! threshold.
//!
//! # Invariants
//!
//! - Monotonicity: the counter never decreases. Releasing a lower value is a
//!   no-op.
//! - Release safety: a waiter on threshold `t` returns `true` only if it
//!   observed `state >= t` under the gate's lock.
//! - Bounded wait: no acquire outlives its timeout. A zero timeout never
//!   blocks.
//! - Waiter accounting: `waiters` counts exactly the threads parked inside an
//!   acquire call.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::{cancel::CancelToken, error::GateError};

/// State protected by the gate's mutex.
#[derive(Debug)]
struct Inner {
    /// Sequence counter.
    state: u64,
    /// Threads currently blocked in an acquire call.
    waiters: usize,
}

/// Lock and condition variable shared by every handle to one gate.
///
/// Cancel tokens hold weak references to this so they can wake waiters.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Shared {
    pub(crate) fn new(state: u64) -> Self {
        Self { inner: Mutex::new(Inner { state, waiters: 0 }), cond: Condvar::new() }
    }

    // The counter is a plain integer, a panic while holding the lock cannot
    // leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every blocked waiter so it re-checks its exit conditions.
    ///
    /// Takes the lock first: a waiter that checked its conditions but has
    /// not parked yet still holds it, so the notification cannot slip in
    /// between.
    pub(crate) fn wake_all(&self) {
        let _inner = self.lock();
        self.cond.notify_all();
    }
}

/// Synchronization primitive that blocks callers until a shared sequence
/// counter reaches the threshold they wait for.
///
/// Cloning yields another handle to the same gate.
///
/// # Example
///
/// ```
/// use std::{thread, time::Duration};
///
/// use seqgate_core::CountingGate;
///
/// let gate = CountingGate::new();
/// let waiter = {
///     let gate = gate.clone();
///     thread::spawn(move || gate.acquire(1, Duration::from_secs(10)))
/// };
///
/// gate.release(1);
/// assert!(waiter.join().unwrap_or(false));
/// ```
#[derive(Clone)]
pub struct CountingGate {
    shared: Arc<Shared>,
}

impl CountingGate {
    /// Create a gate with state 0.
    pub fn new() -> Self {
        Self::with_state(0)
    }

    /// Create a gate starting at `state`.
    pub fn with_state(state: u64) -> Self {
        Self { shared: Arc::new(Shared::new(state)) }
    }

    /// Block until the counter reaches `threshold` or `timeout` elapses.
    ///
    /// Returns `true` if the threshold was reached, `false` on timeout. A
    /// zero timeout probes the counter without blocking.
    pub fn acquire(&self, threshold: u64, timeout: Duration) -> bool {
        match self.wait(threshold, timeout, None) {
            Ok(acquired) => acquired,
            // No token, nothing can cancel.
            Err(_) => false,
        }
    }

    /// Like [`acquire`](Self::acquire), but abandons the wait when `token`
    /// is cancelled.
    ///
    /// A threshold that is already met wins over a cancelled token.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Cancelled` if the token fired while the threshold
    /// was still unmet. The gate stays usable.
    pub fn acquire_with(
        &self,
        threshold: u64,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<bool, GateError> {
        let _registration = token.register(&self.shared);
        self.wait(threshold, timeout, Some(token))
    }

    /// Check the counter against `threshold` without blocking.
    pub fn try_acquire(&self, threshold: u64) -> bool {
        self.shared.lock().state >= threshold
    }

    /// Advance the counter to `new_state` and wake waiters.
    ///
    /// The counter becomes `max(state, new_state)`; releasing a lower or
    /// equal value changes nothing.
    pub fn release(&self, new_state: u64) {
        let mut inner = self.shared.lock();
        if new_state <= inner.state {
            tracing::trace!(state = inner.state, requested = new_state, "release clamped");
            return;
        }

        inner.state = new_state;
        tracing::trace!(state = new_state, waiters = inner.waiters, "gate released");
        drop(inner);

        self.shared.cond.notify_all();
    }

    /// Increment the counter by one, wake waiters and return the new value.
    ///
    /// Saturates at `u64::MAX`.
    pub fn advance(&self) -> u64 {
        let mut inner = self.shared.lock();
        inner.state = inner.state.saturating_add(1);
        let state = inner.state;
        tracing::trace!(state, waiters = inner.waiters, "gate advanced");
        drop(inner);

        self.shared.cond.notify_all();
        state
    }

    /// Current counter value. Advisory: it may change right after.
    pub fn state(&self) -> u64 {
        self.shared.lock().state
    }

    /// Whether any thread is blocked in an acquire call.
    ///
    /// Advisory and inherently racy, intended for diagnostics.
    pub fn has_waiters(&self) -> bool {
        self.shared.lock().waiters > 0
    }

    /// Number of threads blocked in an acquire call. Advisory.
    pub fn waiter_count(&self) -> usize {
        self.shared.lock().waiters
    }

    fn wait(
        &self,
        threshold: u64,
        timeout: Duration,
        token: Option<&CancelToken>,
    ) -> Result<bool, GateError> {
        let mut inner = self.shared.lock();

        if inner.state >= threshold {
            return Ok(true);
        }
        if token.is_some_and(CancelToken::is_cancelled) {
            return Err(GateError::Cancelled { threshold, state: inner.state });
        }
        if timeout.is_zero() {
            return Ok(false);
        }

        // Timeouts too large to represent wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        inner.waiters += 1;

        let outcome = loop {
            if inner.state >= threshold {
                break Ok(true);
            }
            if token.is_some_and(CancelToken::is_cancelled) {
                tracing::debug!(threshold, state = inner.state, "acquire cancelled");
                break Err(GateError::Cancelled { threshold, state: inner.state });
            }

            match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        tracing::debug!(threshold, state = inner.state, ?timeout, "acquire timed out");
                        break Ok(false);
                    }
                    inner = match self.shared.cond.wait_timeout(inner, remaining) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    };
                },
                None => {
                    inner = self.shared.cond.wait(inner).unwrap_or_else(PoisonError::into_inner);
                },
            }
        };

        inner.waiters -= 1;
        outcome
    }
}

impl Default for CountingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CountingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("CountingGate")
            .field("state", &inner.state)
            .field("waiters", &inner.waiters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    /// Spin until `gate` reports `count` blocked waiters.
    fn wait_for_waiters(gate: &CountingGate, count: usize) {
        let start = Instant::now();
        while gate.waiter_count() != count {
            assert!(start.elapsed() < Duration::from_secs(5), "waiters never reached {count}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn new_gate_starts_at_zero() {
        let gate = CountingGate::new();
        assert_eq!(gate.state(), 0);
        assert!(!gate.has_waiters());
    }

    #[test]
    fn with_state_sets_initial_value() {
        let gate = CountingGate::with_state(7);
        assert_eq!(gate.state(), 7);
        assert!(gate.try_acquire(7));
        assert!(!gate.try_acquire(8));
    }

    #[test]
    fn threshold_zero_is_always_met() {
        let gate = CountingGate::new();
        assert!(gate.acquire(0, Duration::ZERO));
    }

    #[test]
    fn release_is_idempotent() {
        let gate = CountingGate::new();
        gate.release(1);
        gate.release(1);
        assert_eq!(gate.state(), 1);
    }

    #[test]
    fn release_never_lowers_state() {
        let gate = CountingGate::with_state(10);
        gate.release(3);
        assert_eq!(gate.state(), 10);
    }

    #[test]
    fn advance_increments_by_one() {
        let gate = CountingGate::with_state(4);
        assert_eq!(gate.advance(), 5);
        assert_eq!(gate.advance(), 6);
        assert_eq!(gate.state(), 6);
    }

    #[test]
    fn advance_saturates() {
        let gate = CountingGate::with_state(u64::MAX);
        assert_eq!(gate.advance(), u64::MAX);
    }

    #[test]
    fn zero_timeout_probe_does_not_block() {
        let gate = CountingGate::new();

        let start = Instant::now();
        assert!(!gate.acquire(5, Duration::ZERO));
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!gate.has_waiters());
    }

    #[test]
    fn acquire_times_out_without_release() {
        let gate = CountingGate::new();

        let start = Instant::now();
        let acquired = gate.acquire(5, Duration::from_millis(200));
        let elapsed = start.elapsed();

        assert!(!acquired);
        assert!(elapsed >= Duration::from_millis(200), "returned early after {elapsed:?}");
        assert!(!gate.has_waiters());
    }

    #[test]
    fn release_wakes_blocked_waiter() {
        let gate = CountingGate::new();
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let acquired = gate.acquire(1, Duration::from_secs(10));
                (acquired, start.elapsed())
            })
        };

        wait_for_waiters(&gate, 1);
        assert!(gate.has_waiters());

        gate.release(1);
        let (acquired, elapsed) = waiter.join().unwrap_or((false, Duration::MAX));

        assert!(acquired);
        assert!(elapsed < Duration::from_secs(5));
        assert!(!gate.has_waiters());
    }

    #[test]
    fn insufficient_release_keeps_waiter_blocked() {
        let gate = CountingGate::new();
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire(3, Duration::from_secs(10)))
        };

        wait_for_waiters(&gate, 1);
        gate.release(2);
        thread::sleep(Duration::from_millis(50));
        assert!(gate.has_waiters(), "waiter released below its threshold");

        gate.advance();
        assert!(waiter.join().unwrap_or(false));
    }

    #[test]
    fn cancel_unblocks_waiter_with_error() {
        let gate = CountingGate::new();
        let token = CancelToken::new();
        let waiter = {
            let gate = gate.clone();
            let token = token.clone();
            thread::spawn(move || gate.acquire_with(9, Duration::from_secs(10), &token))
        };

        wait_for_waiters(&gate, 1);
        token.cancel();

        let result = waiter.join().unwrap_or(Ok(true));
        assert_eq!(result, Err(GateError::Cancelled { threshold: 9, state: 0 }));
        assert!(!gate.has_waiters());
    }

    #[test]
    fn met_threshold_wins_over_cancelled_token() {
        let gate = CountingGate::with_state(3);
        let token = CancelToken::new();
        token.cancel();

        assert_eq!(gate.acquire_with(3, Duration::from_secs(1), &token), Ok(true));
        assert!(gate.acquire_with(4, Duration::ZERO, &token).is_err());
    }

    #[test]
    fn debug_shows_state() {
        let gate = CountingGate::with_state(2);
        let rendered = format!("{gate:?}");
        assert!(rendered.contains("state: 2"));
    }
}
