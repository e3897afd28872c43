//! Gate error types.

use thiserror::Error;

/// Errors from gate acquire operations.
///
/// Timeouts are not errors: an acquire that runs out of time returns
/// `Ok(false)`. Lowering the counter is not an error either, the gate clamps
/// it silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    /// The waiter's cancel token fired before the threshold was reached.
    #[error("acquire cancelled: waiting for {threshold}, gate at {state}")]
    Cancelled {
        /// Threshold the waiter was blocked on.
        threshold: u64,
        /// Gate state observed when the cancellation was noticed.
        state: u64,
    },
}

impl GateError {
    /// Returns true if this error came from a cancel token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
