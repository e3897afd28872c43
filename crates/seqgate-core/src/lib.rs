//! Sequence gate primitives.
//!
//! A sequence gate blocks callers until a monotonically advancing counter
//! reaches the threshold they are waiting for. Releasers move the counter
//! forward and wake every waiter whose threshold is now met.
//!
//! # Components
//!
//! - [`CountingGate`]: blocking gate for OS threads
//! - [`AsyncCountingGate`]: the same contract for tokio tasks
//! - [`CancelToken`]: cooperative cancellation for blocking waiters
//! - [`GateError`]: the cancellation outcome, distinct from a timeout
//!
//! # Outcomes
//!
//! | Situation | Blocking result | Async result |
//! |---|---|---|
//! | threshold met | `Ok(true)` / `true` | `true` |
//! | timeout elapsed | `Ok(false)` / `false` | `false` |
//! | token cancelled | `Err(GateError::Cancelled)` | future dropped |

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod async_gate;
mod cancel;
mod error;
mod gate;

pub use async_gate::AsyncCountingGate;
pub use cancel::CancelToken;
pub use error::GateError;
pub use gate::CountingGate;
