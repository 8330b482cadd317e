//! Driving strategies - one swappable implementation per state slot.
//!
//! The state machine holds one strategy per discrete behavior (wall
//! follow, pillar avoidance, corner turn, parking) behind a narrow trait,
//! so a tuned or experimental variant can be dropped in without touching
//! the transition logic. Strategies are pure given their configuration
//! and the perception snapshot.

use crate::blob::BlobColor;
use crate::params::Parameters;
use crate::world_state::{Pillar, Turn, WorldState};
use serde::{Deserialize, Serialize};

/// One decided control output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveCommand {
    /// -100..=100, negative = reverse
    pub speed: i8,

    /// 0..=180, center steers straight
    pub steering: u8,
}

impl DriveCommand {
    pub fn new(speed: i8, steering: u8) -> Self {
        Self {
            speed: speed.clamp(-100, 100),
            steering: steering.min(180),
        }
    }

    /// Zero speed at the given steering center.
    pub fn stop(steering_center: u8) -> Self {
        Self::new(0, steering_center)
    }
}

/// Steering sign for passing a pillar: red passes right (steer left),
/// green passes left (steer right).
fn steer_sign(color: BlobColor) -> i32 {
    match color {
        BlobColor::Red => -1,
        _ => 1,
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// Keeps the robot centered in the corridor.
pub trait WallFollowStrategy: Send + Sync {
    /// Snapshots tunables for this tick.
    fn configure(&mut self, params: &Parameters);

    fn compute(&self, world: &WorldState) -> DriveCommand;
}

/// Navigates around a confirmed pillar on the correct side.
pub trait AvoidanceStrategy: Send + Sync {
    fn configure(&mut self, params: &Parameters);

    fn compute(&self, pillar: &Pillar, world: &WorldState) -> DriveCommand;

    /// Command held while the latched pillar is out of the camera's view
    /// mid-pass.
    fn blind_hold(&self, color: BlobColor) -> DriveCommand;
}

/// Executes a corner turn in the detected direction.
pub trait CornerStrategy: Send + Sync {
    fn configure(&mut self, params: &Parameters);

    fn compute(&self, direction: Turn, world: &WorldState) -> DriveCommand;
}

/// The parking maneuver at the end of the final lap.
pub trait ParkingStrategy: Send + Sync {
    fn configure(&mut self, params: &Parameters);

    fn compute(&mut self, world: &WorldState) -> DriveCommand;

    /// Whether the maneuver has finished.
    fn is_complete(&self) -> bool;

    /// Resets state for a new attempt.
    fn reset(&mut self);
}

// ============================================================================
// WALL FOLLOW
// ============================================================================

/// Proportional control toward the corridor center.
///
/// With both walls visible, the target is the clamped corridor midpoint;
/// with one wall, hold the minimum clearance from it. The error feeds a
/// proportional gain into the steering offset.
#[derive(Debug, Clone)]
pub struct ProportionalWallFollow {
    pub kp: f32,
    pub normal_speed: i8,
    pub steering_center: u8,
    pub min_clearance: f32,
    pub steering_min: u8,
    pub steering_max: u8,
}

impl Default for ProportionalWallFollow {
    fn default() -> Self {
        Self {
            kp: 0.5,
            normal_speed: 60,
            steering_center: 90,
            min_clearance: 150.0,
            steering_min: 60,
            steering_max: 120,
        }
    }
}

impl WallFollowStrategy for ProportionalWallFollow {
    fn configure(&mut self, params: &Parameters) {
        self.kp = params.wall_follow_kp;
        self.normal_speed = params.normal_speed;
        self.steering_center = params.steering_center;
        self.min_clearance = params.min_wall_clearance;
    }

    fn compute(&self, world: &WorldState) -> DriveCommand {
        let left = world.walls.left;
        let right = world.walls.right;

        let error = match (left, right) {
            (None, None) => return DriveCommand::new(self.normal_speed, self.steering_center),
            (None, Some(r)) => r - self.min_clearance,
            (Some(l), None) => self.min_clearance - l,
            (Some(l), Some(r)) => {
                let corridor = l + r;
                let target = (corridor / 2.0)
                    .clamp(self.min_clearance, (corridor - self.min_clearance).max(self.min_clearance));
                r - target
            }
        };

        let steering = (self.steering_center as i32 + (self.kp * error) as i32)
            .clamp(self.steering_min as i32, self.steering_max as i32);
        DriveCommand::new(self.normal_speed, steering as u8)
    }
}

// ============================================================================
// PILLAR AVOIDANCE
// ============================================================================

/// Steer away proportionally to pillar urgency.
///
/// Urgency grows as the square root of closeness, so the offset ramps in
/// early instead of waiting until the pillar fills the view. The pillar's
/// own bearing adds a correction: a pillar already on the evasion side
/// needs a harder swing.
#[derive(Debug, Clone)]
pub struct ProportionalAvoidance {
    pub slow_speed: i8,
    pub steering_center: u8,
    pub min_steer_offset: u8,
    pub max_steer_offset: u8,
    pub max_distance: f32,
    pub angle_gain: f32,
    pub steering_min: u8,
    pub steering_max: u8,
}

impl Default for ProportionalAvoidance {
    fn default() -> Self {
        Self {
            slow_speed: 35,
            steering_center: 90,
            min_steer_offset: 45,
            max_steer_offset: 80,
            max_distance: 800.0,
            angle_gain: 0.8,
            steering_min: 10,
            steering_max: 170,
        }
    }
}

impl AvoidanceStrategy for ProportionalAvoidance {
    fn configure(&mut self, params: &Parameters) {
        self.slow_speed = params.slow_speed;
        self.steering_center = params.steering_center;
        self.min_steer_offset = params.avoid_min_steer_offset;
        self.max_steer_offset = params.avoid_max_steer_offset;
        self.max_distance = params.avoid_max_distance;
        self.angle_gain = params.avoid_angle_gain;
    }

    fn compute(&self, pillar: &Pillar, _world: &WorldState) -> DriveCommand {
        let direction = steer_sign(pillar.color);

        let urgency = (1.0 - (pillar.distance / self.max_distance).min(1.0)).sqrt();
        let span = (self.max_steer_offset - self.min_steer_offset) as f32;
        let base = (self.min_steer_offset as f32 + urgency * span) as i32;

        let correction = direction as f32 * pillar.angle * self.angle_gain;
        let offset = (base as f32 + correction)
            .clamp(self.min_steer_offset as f32, self.max_steer_offset as f32)
            as i32;

        let steering = (self.steering_center as i32 + direction * offset)
            .clamp(self.steering_min as i32, self.steering_max as i32);
        DriveCommand::new(self.slow_speed, steering as u8)
    }

    fn blind_hold(&self, color: BlobColor) -> DriveCommand {
        let direction = steer_sign(color);
        let steering = (self.steering_center as i32 + direction * self.max_steer_offset as i32)
            .clamp(self.steering_min as i32, self.steering_max as i32);
        DriveCommand::new(self.slow_speed, steering as u8)
    }
}

// ============================================================================
// CORNER
// ============================================================================

/// Fixed-offset turn in the detected direction at reduced speed.
#[derive(Debug, Clone)]
pub struct CornerTurn {
    pub slow_speed: i8,
    pub steering_center: u8,
    pub turn_offset: u8,
}

impl Default for CornerTurn {
    fn default() -> Self {
        Self {
            slow_speed: 35,
            steering_center: 90,
            turn_offset: 25,
        }
    }
}

impl CornerStrategy for CornerTurn {
    fn configure(&mut self, params: &Parameters) {
        self.slow_speed = params.slow_speed;
        self.steering_center = params.steering_center;
        self.turn_offset = params.corner_turn_offset;
    }

    fn compute(&self, direction: Turn, _world: &WorldState) -> DriveCommand {
        let steering = match direction {
            Turn::Left => self.steering_center.saturating_sub(self.turn_offset),
            Turn::Right => (self.steering_center as i32 + self.turn_offset as i32).min(180) as u8,
        };
        DriveCommand::new(self.slow_speed, steering)
    }
}

// ============================================================================
// PARKING
// ============================================================================

/// Placeholder parking: stop in place and report the maneuver complete.
///
/// The full parallel-park sequence lives outside this library; this
/// implementation satisfies the interface so the race can reach `Done`.
#[derive(Debug, Clone, Default)]
pub struct HoldParking {
    steering_center: u8,
    entered: bool,
}

impl HoldParking {
    pub fn new() -> Self {
        Self {
            steering_center: 90,
            entered: false,
        }
    }
}

impl ParkingStrategy for HoldParking {
    fn configure(&mut self, params: &Parameters) {
        self.steering_center = params.steering_center;
    }

    fn compute(&mut self, _world: &WorldState) -> DriveCommand {
        self.entered = true;
        DriveCommand::stop(self.steering_center)
    }

    fn is_complete(&self) -> bool {
        self.entered
    }

    fn reset(&mut self) {
        self.entered = false;
    }
}
