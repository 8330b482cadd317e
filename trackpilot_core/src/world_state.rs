//! Fused perception output.
//!
//! `WorldState` is the robot's combined understanding of the current
//! instant, produced once per tick by sensor fusion and consumed by the
//! track map and the decision layer. It is an immutable value; a fresh
//! one replaces it on the next tick.

use crate::blob::BlobColor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A turn direction, as seen from the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Turn {
    Left,
    Right,
}

impl std::fmt::Display for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Turn::Left => write!(f, "LEFT"),
            Turn::Right => write!(f, "RIGHT"),
        }
    }
}

/// A side of the track relative to the robot's heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Wall distances in the cardinal directions. Any side may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WallInfo {
    /// mm to the left wall (270 degrees)
    pub left: Option<f32>,

    /// mm to the right wall (90 degrees)
    pub right: Option<f32>,

    /// mm to the front wall (0 degrees)
    pub front: Option<f32>,
}

impl WallInfo {
    /// Total corridor width; defined only when both side walls are seen.
    pub fn corridor_width(&self) -> Option<f32> {
        match (self.left, self.right) {
            (Some(l), Some(r)) => Some(l + r),
            _ => None,
        }
    }
}

/// A confirmed pillar: camera color blob + pillar-sized LIDAR cluster
/// matching in angle.
///
/// The camera contributes the color and angle, the LIDAR the
/// authoritative distance. Unconfirmed detections from either sensor
/// never become pillars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pillar {
    /// Red or Green (magenta markers are not pillars)
    pub color: BlobColor,

    /// Signed camera-frame angle in degrees; positive = right
    pub angle: f32,

    /// mm, from the matched LIDAR cluster
    pub distance: f32,
}

impl Pillar {
    /// Which side to pass on: red = right, green = left.
    pub fn pass_side(&self) -> Side {
        match self.color {
            BlobColor::Red => Side::Right,
            _ => Side::Left,
        }
    }

    /// Whether the pillar is roughly ahead and needs avoidance.
    pub fn is_blocking(&self, angle_threshold: f32) -> bool {
        self.angle.abs() < angle_threshold
    }
}

/// Default blocking-cone half-angle in degrees.
pub const BLOCKING_ANGLE: f32 = 30.0;

/// The fused perception snapshot for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Monotonic time of the fusion call
    pub timestamp: Duration,

    /// Encoder position at the fusion call
    pub encoder_pos: i64,

    pub walls: WallInfo,

    /// Confirmed pillars, in no particular order
    pub pillars: Vec<Pillar>,

    /// Corner detected ahead, and its direction
    pub corner_ahead: Option<Turn>,

    /// Distance to the parking marker in mm, if visible
    pub parking_marker: Option<f32>,
}

impl WorldState {
    pub fn corridor_width(&self) -> Option<f32> {
        self.walls.corridor_width()
    }

    pub fn has_pillars(&self) -> bool {
        !self.pillars.is_empty()
    }

    /// The nearest confirmed pillar.
    pub fn closest_pillar(&self) -> Option<&Pillar> {
        self.pillars
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// The nearest pillar inside the blocking cone, requiring avoidance.
    pub fn blocking_pillar(&self) -> Option<&Pillar> {
        self.pillars
            .iter()
            .filter(|p| p.is_blocking(BLOCKING_ANGLE))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    pub fn is_corner_approaching(&self) -> bool {
        self.corner_ahead.is_some()
    }

    pub fn is_parking_visible(&self) -> bool {
        self.parking_marker.is_some()
    }
}
