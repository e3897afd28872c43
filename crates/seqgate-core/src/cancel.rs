//! Cooperative cancellation for blocking gate waiters.
//!
//! Threads have no native interruption, so a waiter that should be
//! abandonable passes a [`CancelToken`] to
//! [`CountingGate::acquire_with`](crate::CountingGate::acquire_with). While
//! blocked, the waiter is registered on the token; [`CancelToken::cancel`]
//! wakes every registered gate so the waiter can notice the flag and return
//! [`GateError::Cancelled`](crate::GateError::Cancelled).
//!
//! # Invariants
//!
//! - Sticky: once cancelled, a token never resets
//! - Lock order: the registration list lock is never held while taking a
//!   gate's state lock

use std::sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicBool, Ordering},
};

use crate::gate::Shared;

/// Shared cancellation flag.
///
/// Cloning yields another handle to the same flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    /// Gates with a waiter currently observing this token. One entry per
    /// blocked waiter, so the same gate may appear more than once.
    registrations: Mutex<Vec<Weak<Shared>>>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake every waiter observing it.
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let gates: Vec<Arc<Shared>> = self
            .inner
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        tracing::debug!(waiters = gates.len(), "cancel token fired");

        for gate in gates {
            gate.wake_all();
        }
    }

    /// Returns true once [`cancel`](Self::cancel) has been called on any
    /// handle.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a gate so that cancelling wakes its waiters. The
    /// registration lasts until the returned guard is dropped.
    pub(crate) fn register(&self, gate: &Arc<Shared>) -> Registration<'_> {
        let gate = Arc::downgrade(gate);
        self.inner
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(gate.clone());
        Registration { token: self, gate }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

/// Removes one registration entry for a gate on drop.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    gate: Weak<Shared>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut registrations =
            self.token.inner.registrations.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = registrations.iter().position(|g| Weak::ptr_eq(g, &self.gate)) {
            registrations.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        clone.cancel();

        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_twice_is_harmless() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn registration_is_removed_on_drop() {
        let token = CancelToken::new();
        let gate = Arc::new(Shared::new(0));

        {
            let _first = token.register(&gate);
            let _second = token.register(&gate);
            assert_eq!(token.inner.registrations.lock().map(|r| r.len()).unwrap_or(0), 2);
        }

        assert_eq!(token.inner.registrations.lock().map(|r| r.len()).unwrap_or(usize::MAX), 0);
    }
}
