//! Simulation context implementing RobotContext for deterministic runs.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;
use trackpilot_env::RobotContext;

/// Simulation context backed by a manually advanced virtual clock.
///
/// `sleep` advances the clock instead of waiting, so a 60-second race
/// simulates in milliseconds and two runs with the same seed and inputs
/// observe identical timestamps.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Virtual time 0 maps to this wall-clock instant
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 UTC
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time += duration.as_nanos() as u64;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap()
    }
}

#[async_trait]
impl RobotContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn spawn<F>(&self, name: &str, _future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        // The harness steps everything inline; background tasks have no
        // scheduler to run on here.
        warn!(name, "sim context ignores spawned task");
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_advances_virtual_clock() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.sleep(Duration::from_millis(20)).await;
        assert_eq!(ctx.now(), Duration::from_millis(20));
    }

    #[test]
    fn test_seed_reported() {
        assert_eq!(SimContext::new(7).seed(), 7);
    }
}
