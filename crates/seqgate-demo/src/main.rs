//! Sequence gate demo binary.
//!
//! # Usage
//!
//! ```bash
//! # Waiter released after one second
//! seqgate-demo
//!
//! # Waiter times out: release never reaches the threshold
//! seqgate-demo --threshold 5 --timeout-ms 200
//!
//! # Waiter cancelled before the release
//! seqgate-demo --cancel-after-ms 300
//! ```

use std::time::Duration;

use clap::Parser;
use seqgate_demo::{DemoConfig, run};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sequence gate acquire/release demo
#[derive(Parser, Debug)]
#[command(name = "seqgate-demo")]
#[command(about = "Run a waiter and a releaser against one sequence gate")]
#[command(version)]
struct Args {
    /// Counter value the gate starts at
    #[arg(long, default_value = "0")]
    initial_state: u64,

    /// Threshold the waiter blocks on
    #[arg(short, long, default_value = "1")]
    threshold: u64,

    /// Value the releaser advances the gate to
    #[arg(short, long, default_value = "1")]
    release_to: u64,

    /// Waiter timeout in milliseconds (0 probes without blocking)
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Delay before the releaser starts, in milliseconds
    #[arg(long, default_value = "1000")]
    release_delay_ms: u64,

    /// Delay between release and waiter probe, in milliseconds
    #[arg(long, default_value = "500")]
    probe_delay_ms: u64,

    /// Cancel the waiter after this many milliseconds
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<&Args> for DemoConfig {
    fn from(args: &Args) -> Self {
        Self {
            initial_state: args.initial_state,
            threshold: args.threshold,
            release_to: args.release_to,
            acquire_timeout: Duration::from_millis(args.timeout_ms),
            release_delay: Duration::from_millis(args.release_delay_ms),
            probe_delay: Duration::from_millis(args.probe_delay_ms),
            cancel_after: args.cancel_after_ms.map(Duration::from_millis),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = DemoConfig::from(&args);
    tracing::info!(
        threshold = config.threshold,
        release_to = config.release_to,
        timeout = ?config.acquire_timeout,
        "Starting gate demo"
    );

    let report = run(&config)?;

    tracing::info!(waited = ?report.waited, "Waiter {}", report.outcome);
    if report.waiters_after_release {
        tracing::info!("Waiters remained after release");
    } else {
        tracing::info!("No waiters remained after release");
    }
    tracing::info!("Final gate state: {}", report.final_state);

    Ok(())
}
