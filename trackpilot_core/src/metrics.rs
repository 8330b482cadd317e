//! Loop timing and odometry metrics.
//!
//! `TickStats` tracks how the control loop is holding its budget;
//! `Odometry` turns raw encoder deltas into wheel speed and distance
//! using the calibration parameters. Both are log/diagnostic surfaces -
//! nothing in the decision path reads them.

use crate::params::Parameters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// EMA weight for rate smoothing (0.3 new, 0.7 old).
const SMOOTHING: f64 = 0.3;

/// Control-loop timing statistics.
#[derive(Debug, Clone, Default)]
pub struct TickStats {
    ticks: u64,
    overruns: u64,
    ema_tick: Option<f64>,
}

impl TickStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one tick's execution time against its budget.
    pub fn record(&mut self, elapsed: Duration, budget: Duration) {
        self.ticks += 1;
        if elapsed > budget {
            self.overruns += 1;
        }
        let secs = elapsed.as_secs_f64();
        self.ema_tick = Some(match self.ema_tick {
            Some(ema) => (1.0 - SMOOTHING) * ema + SMOOTHING * secs,
            None => secs,
        });
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Smoothed tick execution time in seconds.
    pub fn mean_tick_secs(&self) -> f64 {
        self.ema_tick.unwrap_or(0.0)
    }
}

/// Derived drive metrics for one report instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryReport {
    pub ticks_per_sec: f64,
    pub rpm: f64,
    pub speed_cm_s: f64,
    pub distance_cm: f64,
}

/// Encoder-delta odometry.
///
/// Accumulates absolute travel regardless of direction and smooths the
/// tick rate with an EMA so single noisy status frames do not spike the
/// speed estimate.
#[derive(Debug, Clone, Default)]
pub struct Odometry {
    prev_encoder: Option<(i64, Duration)>,
    ticks_per_sec: f64,
    total_ticks: u64,
}

impl Odometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a fresh encoder reading with its receive time.
    pub fn update(&mut self, encoder: i64, now: Duration) {
        let Some((prev, prev_time)) = self.prev_encoder else {
            self.prev_encoder = Some((encoder, now));
            return;
        };

        let dt = now.saturating_sub(prev_time).as_secs_f64();
        // Sub-5ms gaps amplify quantization noise; wait for the next frame
        if dt < 0.005 {
            return;
        }

        let delta = encoder - prev;
        self.total_ticks += delta.unsigned_abs();

        let raw = delta as f64 / dt;
        self.ticks_per_sec = (1.0 - SMOOTHING) * self.ticks_per_sec + SMOOTHING * raw;
        self.prev_encoder = Some((encoder, now));
    }

    /// Converts to physical units with the current calibration.
    ///
    /// An uncalibrated encoder (cpr = 0) reports raw tick rate only.
    pub fn report(&self, params: &Parameters) -> OdometryReport {
        let cpr = params.encoder_cpr as f64;
        if cpr <= 0.0 {
            return OdometryReport {
                ticks_per_sec: self.ticks_per_sec,
                ..OdometryReport::default()
            };
        }

        let circumference_cm = std::f64::consts::PI * params.wheel_diameter_mm as f64 / 10.0;
        OdometryReport {
            ticks_per_sec: self.ticks_per_sec,
            rpm: (self.ticks_per_sec / cpr) * 60.0,
            speed_cm_s: (self.ticks_per_sec / cpr) * circumference_cm,
            distance_cm: (self.total_ticks as f64 / cpr) * circumference_cm,
        }
    }
}
