//! Core environment context trait for the TrackPilot pipeline.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the perception and
/// decision layers can run in both production (tokio) and simulation
/// (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and the system clock
/// - **Simulation**: `SimContext` (in the sim crate) - manually advanced clock
///
/// # Determinism
///
/// All methods that would normally introduce non-determinism (time) are
/// controlled by the implementation; a simulated run with the same seed
/// and inputs replays identically.
#[async_trait]
pub trait RobotContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for tick scheduling and `WorldState` timestamps.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for logs and persisted snapshots.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`.
    /// In simulation: advances the virtual clock.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task (sensor acquisition, keepalive).
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
