//! Error types for the TrackPilot environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A sensor provider failed (acquisition thread died, device gone)
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// The downstream motor link failed (port closed, write error)
    #[error("Link error: {0}")]
    Link(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a sensor error.
    pub fn sensor(msg: impl Into<String>) -> Self {
        Self::Sensor(msg.into())
    }

    /// Creates a link error.
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }
}
