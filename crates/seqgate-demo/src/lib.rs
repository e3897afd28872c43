//! Two-thread acquire/release choreography.
//!
//! A waiter thread blocks on a [`CountingGate`] while a releaser thread
//! advances it, then the releaser reports whether anyone is still waiting.
//! Timings are configurable so the same run can demonstrate a release, a
//! timeout or a cancellation.
//!
//! ## Timeline
//!
//! ```text
//! t=0                waiter:   acquire_with(threshold, acquire_timeout)
//! t=release_delay    releaser: release(release_to)
//! +probe_delay       releaser: has_waiters()
//! t=cancel_after     canceller: token.cancel()       (optional)
//! ```
//!
//! The outcome is decided by the gate's contract, not by the sleeps: a
//! waiter returns `Acquired` only if the counter reached its threshold.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;

use std::{
    fmt, thread,
    time::{Duration, Instant},
};

pub use error::DemoError;
use seqgate_core::{CancelToken, CountingGate, GateError};

/// Longest acquire timeout the demo accepts.
pub const MAX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Choreography configuration.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Counter value the gate starts at
    pub initial_state: u64,
    /// Threshold the waiter blocks on
    pub threshold: u64,
    /// Value the releaser advances the gate to
    pub release_to: u64,
    /// How long the waiter is willing to block
    pub acquire_timeout: Duration,
    /// Delay between starting the waiter and starting the releaser
    pub release_delay: Duration,
    /// Delay between the release and the waiter probe
    pub probe_delay: Duration,
    /// Cancel the waiter this long after it starts
    pub cancel_after: Option<Duration>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            initial_state: 0,
            threshold: 1,
            release_to: 1,
            acquire_timeout: Duration::from_secs(10),
            release_delay: Duration::from_secs(1),
            probe_delay: Duration::from_millis(500),
            cancel_after: None,
        }
    }
}

impl DemoConfig {
    /// Check the configuration before any thread is started.
    pub fn validate(&self) -> Result<(), DemoError> {
        if self.acquire_timeout > MAX_ACQUIRE_TIMEOUT {
            return Err(DemoError::Config(format!(
                "acquire timeout {:?} exceeds {:?}",
                self.acquire_timeout, MAX_ACQUIRE_TIMEOUT
            )));
        }
        if self.release_to < self.initial_state {
            tracing::warn!(
                release_to = self.release_to,
                initial_state = self.initial_state,
                "release below initial state will be clamped"
            );
        }
        Ok(())
    }
}

/// How the waiter's acquire ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The counter reached the threshold
    Acquired,
    /// The timeout elapsed first
    TimedOut,
    /// The cancel token fired first
    Cancelled,
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquired => write!(f, "acquired"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What one run observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoReport {
    /// How the waiter's acquire ended
    pub outcome: WaitOutcome,
    /// Time the waiter spent inside acquire
    pub waited: Duration,
    /// Whether the releaser still saw a waiter after its probe delay
    pub waiters_after_release: bool,
    /// Gate state once both threads finished
    pub final_state: u64,
}

/// Run the choreography and report what happened.
///
/// # Errors
///
/// Returns error if:
/// - The configuration is invalid
/// - A worker thread cannot be spawned or panics
pub fn run(config: &DemoConfig) -> Result<DemoReport, DemoError> {
    config.validate()?;

    let gate = CountingGate::with_state(config.initial_state);
    let token = CancelToken::new();

    let waiter = {
        let gate = gate.clone();
        let token = token.clone();
        let (threshold, timeout) = (config.threshold, config.acquire_timeout);
        thread::Builder::new().name("gate-waiter".to_string()).spawn(move || {
            let start = Instant::now();
            let result = gate.acquire_with(threshold, timeout, &token);
            (result, start.elapsed())
        })?
    };

    // Released once the waiter has returned, so the canceller can stand down.
    let waiter_done = CountingGate::new();
    let canceller = match config.cancel_after {
        Some(delay) => {
            let token = token.clone();
            let waiter_done = waiter_done.clone();
            Some(thread::Builder::new().name("gate-canceller".to_string()).spawn(move || {
                if !waiter_done.acquire(1, delay) {
                    token.cancel();
                }
            })?)
        },
        None => None,
    };

    thread::sleep(config.release_delay);

    let releaser = {
        let gate = gate.clone();
        let (release_to, probe_delay) = (config.release_to, config.probe_delay);
        thread::Builder::new().name("gate-releaser".to_string()).spawn(move || {
            gate.release(release_to);
            tracing::debug!(state = gate.state(), "releaser advanced gate");
            thread::sleep(probe_delay);
            gate.has_waiters()
        })?
    };

    let waiters_after_release =
        releaser.join().map_err(|_| DemoError::WorkerPanicked("releaser"))?;
    let (result, waited) = waiter.join().map_err(|_| DemoError::WorkerPanicked("waiter"))?;

    waiter_done.release(1);
    if let Some(canceller) = canceller {
        canceller.join().map_err(|_| DemoError::WorkerPanicked("canceller"))?;
    }

    let outcome = match result {
        Ok(true) => WaitOutcome::Acquired,
        Ok(false) => WaitOutcome::TimedOut,
        Err(GateError::Cancelled { threshold, state }) => {
            tracing::debug!(threshold, state, "waiter cancelled");
            WaitOutcome::Cancelled
        },
    };

    Ok(DemoReport { outcome, waited, waiters_after_release, final_state: gate.state() })
}
