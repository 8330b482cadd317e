//! Pipeline invariant auditor.
//!
//! The Oracle watches every tick of a simulated run and records
//! violations of the contracts the pipeline promises:
//! - every confirmed pillar is backed by a same-color blob within the
//!   match threshold and carries a plausible LIDAR range
//! - recorded corners are separated by at least the corner tolerance
//! - a finalized track map never changes again
//! - the avoidance state holds for at least the minimum frame count
//! - world timestamps are monotone

use std::time::Duration;
use trackpilot_core::{ColorBlob, Parameters, RobotState, TrackMap, WorldState};

/// Snapshot of the map's observable contents, for freeze checking.
#[derive(Debug, Clone, PartialEq)]
struct MapFingerprint {
    corners: usize,
    sections: usize,
    pillars: usize,
    lap_length: Option<i64>,
    parking_zone: Option<(i64, i64)>,
}

impl MapFingerprint {
    fn of(map: &TrackMap) -> Self {
        Self {
            corners: map.corner_count(),
            sections: map.sections().len(),
            pillars: map.pillars().len(),
            lap_length: map.lap_length(),
            parking_zone: map.parking_zone(),
        }
    }
}

/// Per-tick invariant auditor for simulated runs.
pub struct Oracle {
    violations: Vec<String>,
    last_timestamp: Option<Duration>,
    frozen_map: Option<MapFingerprint>,
    avoid_entry_tick: Option<u64>,
    last_state: RobotState,
}

impl Oracle {
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
            last_timestamp: None,
            frozen_map: None,
            avoid_entry_tick: None,
            last_state: RobotState::Idle,
        }
    }

    /// Observes one tick.
    pub fn observe(
        &mut self,
        tick: u64,
        world: &WorldState,
        blobs: &[ColorBlob],
        map: &TrackMap,
        state: RobotState,
        params: &Parameters,
    ) {
        self.check_timestamps(tick, world);
        self.check_pillars(tick, world, blobs, params);
        self.check_corner_spacing(tick, map);
        self.check_map_frozen(tick, map);
        self.check_avoid_hysteresis(tick, state, params);
        self.last_state = state;
    }

    /// Violations recorded so far; empty means the run held its contracts.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn fail(&mut self, tick: u64, message: String) {
        self.violations.push(format!("tick {tick}: {message}"));
    }

    fn check_timestamps(&mut self, tick: u64, world: &WorldState) {
        if let Some(last) = self.last_timestamp {
            if world.timestamp < last {
                self.fail(
                    tick,
                    format!(
                        "timestamp regressed: {:?} after {:?}",
                        world.timestamp, last
                    ),
                );
            }
        }
        self.last_timestamp = Some(world.timestamp);
    }

    fn check_pillars(
        &mut self,
        tick: u64,
        world: &WorldState,
        blobs: &[ColorBlob],
        params: &Parameters,
    ) {
        for pillar in &world.pillars {
            if !pillar.color.is_pillar() {
                self.fail(tick, format!("pillar with non-pillar color {}", pillar.color));
            }
            if pillar.distance < params.lidar_min_distance
                || pillar.distance > params.lidar_max_distance
            {
                self.fail(
                    tick,
                    format!("pillar range {} outside LIDAR band", pillar.distance),
                );
            }
            let confirmed = blobs.iter().any(|b| {
                b.color == pillar.color
                    && (b.angle - pillar.angle).abs() < params.angle_match_threshold
            });
            if !confirmed {
                self.fail(
                    tick,
                    format!(
                        "{} pillar at {:.1} deg has no confirming blob",
                        pillar.color, pillar.angle
                    ),
                );
            }
        }
    }

    fn check_corner_spacing(&mut self, tick: u64, map: &TrackMap) {
        for pair in map.corners().windows(2) {
            let spacing = (pair[1].encoder_pos - pair[0].encoder_pos).abs();
            if spacing < 100 {
                self.fail(tick, format!("corners {spacing} ticks apart"));
                return;
            }
        }
    }

    fn check_map_frozen(&mut self, tick: u64, map: &TrackMap) {
        if !map.first_lap_complete() {
            return;
        }
        let fingerprint = MapFingerprint::of(map);
        match &self.frozen_map {
            None => self.frozen_map = Some(fingerprint),
            Some(frozen) => {
                if *frozen != fingerprint {
                    self.fail(tick, "finalized track map changed".to_string());
                }
            }
        }
    }

    fn check_avoid_hysteresis(&mut self, tick: u64, state: RobotState, params: &Parameters) {
        let was_avoiding = self.last_state == RobotState::AvoidPillar;
        let is_avoiding = state == RobotState::AvoidPillar;

        if is_avoiding && !was_avoiding {
            self.avoid_entry_tick = Some(tick);
        }
        if was_avoiding && !is_avoiding {
            if let Some(entry) = self.avoid_entry_tick.take() {
                let held = tick.saturating_sub(entry);
                if held < params.min_avoid_frames as u64 {
                    self.fail(
                        tick,
                        format!(
                            "left avoidance after {held} frames (minimum {})",
                            params.min_avoid_frames
                        ),
                    );
                }
            }
        }
    }
}

impl Default for Oracle {
    fn default() -> Self {
        Self::new()
    }
}
