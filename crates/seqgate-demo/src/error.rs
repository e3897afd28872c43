//! Demo error types.

use thiserror::Error;

/// Errors that can occur while running the choreography.
#[derive(Debug, Error)]
pub enum DemoError {
    /// Configuration rejected before any thread started
    #[error("configuration error: {0}")]
    Config(String),

    /// The OS refused to start a worker thread
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread panicked before reporting
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(DemoError::WorkerPanicked("waiter").to_string(), "waiter thread panicked");
        assert_eq!(
            DemoError::Config("bad".to_string()).to_string(),
            "configuration error: bad"
        );
    }
}
