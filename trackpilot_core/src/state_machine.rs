//! High-level race state machine.
//!
//! Holds the discrete robot state, enforces priority transitions with
//! explicit hysteresis, and dispatches each tick to the strategy for the
//! active state. `decide` is a pure function of the current state, the
//! perception snapshot, the track map, and the parameter snapshot:
//! identical sequences produce identical outputs.
//!
//! The avoidance hysteresis is mandatory. Without a minimum dwell the
//! robot oscillates between `AvoidPillar` and `WallFollow` whenever the
//! pillar briefly leaves the camera's field of view mid-pass.

use crate::blob::BlobColor;
use crate::params::Parameters;
use crate::strategies::{
    AvoidanceStrategy, CornerStrategy, CornerTurn, DriveCommand, HoldParking, ParkingStrategy,
    ProportionalAvoidance, ProportionalWallFollow, WallFollowStrategy,
};
use crate::track_map::{TrackDirection, TrackMap};
use crate::world_state::{Pillar, Turn, WorldState};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Discrete robot states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotState {
    /// Waiting to start
    Idle,
    /// Default driving, maintain corridor center
    WallFollow,
    /// Pillar detected, navigate around it
    AvoidPillar,
    /// Corner ahead, execute the turn
    Corner,
    /// Parking sequence
    Parking,
    /// Race complete
    Done,
}

/// Progress through one avoidance maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvoidPhase {
    Approach,
    Passing,
    Clearing,
}

/// Context valid only while the state is `AvoidPillar`. Reset on entry.
#[derive(Debug, Clone)]
struct AvoidCtx {
    /// Color latched at the transition; the maneuver tracks this pillar
    color: BlobColor,
    phase: AvoidPhase,
    frames: u32,
}

/// Transition tuning.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub target_laps: u32,

    /// Transitions out of `AvoidPillar` are suppressed for this many ticks
    pub min_avoid_frames: u32,

    /// A visible latched pillar beyond this range counts as cleared, mm
    pub clear_distance: f32,

    /// A visible latched pillar beyond this bearing counts as cleared,
    /// degrees (outside the body half-width at close range)
    pub clear_angle: f32,

    /// Corner exits closer than this many encoder ticks are one corner
    pub corner_spacing: i64,

    pub steering_center: u8,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            target_laps: 3,
            min_avoid_frames: 25,
            clear_distance: 600.0,
            clear_angle: 65.0,
            corner_spacing: 100,
            steering_center: 90,
        }
    }
}

/// Priority-ordered finite-state controller.
pub struct StateMachine {
    state: RobotState,
    lap_count: u32,
    corners_passed: u32,
    last_corner_exit: Option<i64>,
    direction: Option<TrackDirection>,
    avoid: Option<AvoidCtx>,
    config: MachineConfig,

    wall_follow: Box<dyn WallFollowStrategy>,
    avoidance: Box<dyn AvoidanceStrategy>,
    corner: Box<dyn CornerStrategy>,
    parking: Box<dyn ParkingStrategy>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::with_strategies(
            Box::new(ProportionalWallFollow::default()),
            Box::new(ProportionalAvoidance::default()),
            Box::new(CornerTurn::default()),
            Box::new(HoldParking::new()),
        )
    }

    pub fn with_strategies(
        wall_follow: Box<dyn WallFollowStrategy>,
        avoidance: Box<dyn AvoidanceStrategy>,
        corner: Box<dyn CornerStrategy>,
        parking: Box<dyn ParkingStrategy>,
    ) -> Self {
        Self {
            state: RobotState::Idle,
            lap_count: 0,
            corners_passed: 0,
            last_corner_exit: None,
            direction: None,
            avoid: None,
            config: MachineConfig::default(),
            wall_follow,
            avoidance,
            corner,
            parking,
        }
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn lap_count(&self) -> u32 {
        self.lap_count
    }

    pub fn direction(&self) -> Option<TrackDirection> {
        self.direction
    }

    /// The color being avoided, while in `AvoidPillar`.
    pub fn avoiding(&self) -> Option<BlobColor> {
        self.avoid.as_ref().map(|ctx| ctx.color)
    }

    /// Starts the race.
    pub fn start(&mut self) {
        self.state = RobotState::WallFollow;
        self.lap_count = 0;
        self.corners_passed = 0;
        self.last_corner_exit = None;
        self.avoid = None;
        info!("race started");
    }

    /// Stops the robot.
    pub fn stop(&mut self) {
        self.state = RobotState::Done;
        info!("race stopped");
    }

    /// Decides speed and steering for this tick.
    pub fn decide(
        &mut self,
        world: &WorldState,
        track_map: &TrackMap,
        params: &Parameters,
    ) -> DriveCommand {
        if matches!(self.state, RobotState::Idle | RobotState::Done) {
            return DriveCommand::stop(self.config.steering_center);
        }

        // Snapshot tunables into strategy and transition configs
        self.wall_follow.configure(params);
        self.avoidance.configure(params);
        self.corner.configure(params);
        self.parking.configure(params);
        self.config.target_laps = params.target_laps;
        self.config.min_avoid_frames = params.min_avoid_frames;
        self.config.clear_distance = params.clear_distance;
        self.config.clear_angle = params.clear_angle;
        self.config.steering_center = params.steering_center;

        if self.direction.is_none() {
            if let Some(dir) = track_map.direction() {
                self.direction = Some(dir);
                info!(?dir, "race direction latched");
            }
        }

        self.check_transitions(world, track_map);

        match self.state {
            RobotState::WallFollow => self.wall_follow.compute(world),
            RobotState::AvoidPillar => self.dispatch_avoidance(world),
            RobotState::Corner => {
                let direction = world.corner_ahead.unwrap_or(Turn::Right);
                self.corner.compute(direction, world)
            }
            RobotState::Parking => self.parking.compute(world),
            RobotState::Idle | RobotState::Done => {
                DriveCommand::stop(self.config.steering_center)
            }
        }
    }

    fn dispatch_avoidance(&mut self, world: &WorldState) -> DriveCommand {
        let Some(ctx) = &self.avoid else {
            // Guard contradiction: in AvoidPillar with no latched context.
            error!("avoidance state without context, forcing wall follow");
            self.state = RobotState::WallFollow;
            return self.wall_follow.compute(world);
        };

        match latched_pillar(world, ctx.color) {
            Some(pillar) => self.avoidance.compute(pillar, world),
            None => self.avoidance.blind_hold(ctx.color),
        }
    }

    fn check_transitions(&mut self, world: &WorldState, track_map: &TrackMap) {
        match self.state {
            RobotState::WallFollow => {
                if let Some(pillar) = world.blocking_pillar() {
                    self.enter_avoidance(pillar);
                } else if world.is_corner_approaching() {
                    self.state = RobotState::Corner;
                    info!(direction = ?world.corner_ahead, "WALL_FOLLOW -> CORNER");
                } else if self.lap_count >= self.config.target_laps
                    && world.is_parking_visible()
                {
                    self.state = RobotState::Parking;
                    self.parking.reset();
                    info!("WALL_FOLLOW -> PARKING");
                }
            }

            RobotState::AvoidPillar => {
                let Some(ctx) = &mut self.avoid else {
                    error!("avoidance state without context, forcing wall follow");
                    self.state = RobotState::WallFollow;
                    return;
                };
                ctx.frames += 1;

                let visible = latched_pillar(world, ctx.color);

                // Track maneuver progress for observers
                if let Some(pillar) = visible {
                    if pillar.distance < 300.0 {
                        ctx.phase = AvoidPhase::Passing;
                    } else if ctx.phase == AvoidPhase::Passing && pillar.distance > 400.0 {
                        ctx.phase = AvoidPhase::Clearing;
                    }
                }

                // Hysteresis: hold the maneuver no matter what the world says
                if ctx.frames < self.config.min_avoid_frames {
                    return;
                }

                let cleared = match visible {
                    None => ctx.frames > 2 * self.config.min_avoid_frames,
                    Some(pillar) => {
                        pillar.distance > self.config.clear_distance
                            || pillar.angle.abs() > self.config.clear_angle
                    }
                };

                if cleared {
                    info!(frames = ctx.frames, "AVOID_PILLAR -> WALL_FOLLOW");
                    self.avoid = None;
                    self.state = RobotState::WallFollow;
                }
            }

            RobotState::Corner => {
                if let Some(pillar) = world.blocking_pillar() {
                    // A pillar inside the turn overrides the corner
                    self.enter_avoidance(pillar);
                } else if !world.is_corner_approaching() {
                    self.finish_corner(world, track_map);
                }
            }

            RobotState::Parking => {
                if self.parking.is_complete() {
                    self.state = RobotState::Done;
                    info!("PARKING -> DONE");
                }
            }

            RobotState::Idle | RobotState::Done => {}
        }
    }

    fn enter_avoidance(&mut self, pillar: &Pillar) {
        info!(
            color = %pillar.color,
            distance = pillar.distance,
            angle = pillar.angle,
            "-> AVOID_PILLAR"
        );
        self.avoid = Some(AvoidCtx {
            color: pillar.color,
            phase: AvoidPhase::Approach,
            frames: 0,
        });
        self.state = RobotState::AvoidPillar;
    }

    /// Corner exit: count it (deduplicated by encoder spacing), close the
    /// lap every fourth corner, and either continue or finish the race.
    fn finish_corner(&mut self, world: &WorldState, track_map: &TrackMap) {
        self.state = RobotState::WallFollow;

        let duplicate = self
            .last_corner_exit
            .map(|last| (world.encoder_pos - last).abs() < self.config.corner_spacing)
            .unwrap_or(false);
        if duplicate {
            return;
        }
        self.last_corner_exit = Some(world.encoder_pos);
        self.corners_passed += 1;
        info!(count = self.corners_passed, "CORNER -> WALL_FOLLOW");

        if self.corners_passed % 4 == 0 {
            self.lap_count = self.corners_passed / 4;
            info!(lap = self.lap_count, "lap complete");

            if self.lap_count >= self.config.target_laps {
                // With a known parking zone the race ends by parking;
                // otherwise the final corner is the finish line.
                if track_map.parking_zone().is_none() {
                    self.state = RobotState::Done;
                    info!("race complete");
                }
            }
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// The nearest visible pillar of the latched color.
fn latched_pillar(world: &WorldState, color: BlobColor) -> Option<&Pillar> {
    world
        .pillars
        .iter()
        .filter(|p| p.color == color)
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_state::WallInfo;
    use std::time::Duration;

    fn params() -> Parameters {
        Parameters::default()
    }

    fn empty_world(encoder: i64) -> WorldState {
        WorldState {
            timestamp: Duration::ZERO,
            encoder_pos: encoder,
            ..WorldState::default()
        }
    }

    fn pillar_world(color: BlobColor, angle: f32, distance: f32) -> WorldState {
        WorldState {
            pillars: vec![Pillar {
                color,
                angle,
                distance,
            }],
            ..empty_world(0)
        }
    }

    fn corner_world(encoder: i64) -> WorldState {
        WorldState {
            corner_ahead: Some(Turn::Right),
            ..empty_world(encoder)
        }
    }

    fn started() -> StateMachine {
        let mut sm = StateMachine::new();
        sm.start();
        sm
    }

    #[test]
    fn test_idle_outputs_stop() {
        let mut sm = StateMachine::new();
        let cmd = sm.decide(&empty_world(0), &TrackMap::new(), &params());
        assert_eq!(cmd, DriveCommand::stop(90));
        assert_eq!(sm.state(), RobotState::Idle);
    }

    #[test]
    fn test_empty_world_wall_follows_straight() {
        let mut sm = started();
        let cmd = sm.decide(&empty_world(0), &TrackMap::new(), &params());
        assert_eq!(cmd, DriveCommand::new(60, 90));
        assert_eq!(sm.state(), RobotState::WallFollow);
    }

    #[test]
    fn test_off_center_corridor() {
        let mut sm = started();
        let world = WorldState {
            walls: WallInfo {
                left: Some(300.0),
                right: Some(500.0),
                front: Some(2000.0),
            },
            ..empty_world(0)
        };
        let cmd = sm.decide(&world, &TrackMap::new(), &params());
        assert_eq!(cmd, DriveCommand::new(60, 120));
    }

    #[test]
    fn test_blocking_pillar_enters_avoidance() {
        let mut sm = started();
        let world = pillar_world(BlobColor::Red, 12.0, 500.0);
        let cmd = sm.decide(&world, &TrackMap::new(), &params());

        assert_eq!(sm.state(), RobotState::AvoidPillar);
        assert_eq!(sm.avoiding(), Some(BlobColor::Red));
        assert_eq!(cmd, DriveCommand::new(35, 34));
    }

    #[test]
    fn test_wide_pillar_does_not_block() {
        let mut sm = started();
        let world = pillar_world(BlobColor::Red, 50.0, 500.0);
        sm.decide(&world, &TrackMap::new(), &params());
        assert_eq!(sm.state(), RobotState::WallFollow);
    }

    #[test]
    fn test_avoidance_hysteresis_and_blind_hold() {
        let mut sm = started();
        let map = TrackMap::new();

        // Latch onto a red pillar
        sm.decide(&pillar_world(BlobColor::Red, 10.0, 400.0), &map, &params());
        assert_eq!(sm.state(), RobotState::AvoidPillar);

        // Pillar leaves the FOV: blind hold at max offset, no transition
        // until frames exceed 2 * min_avoid_frames
        for frame in 1..=50 {
            let cmd = sm.decide(&empty_world(0), &map, &params());
            assert_eq!(
                sm.state(),
                RobotState::AvoidPillar,
                "left avoidance at frame {frame}"
            );
            assert_eq!(cmd, DriveCommand::new(35, 10));
        }

        // Frame 51: invisible and past the blind limit - cleared
        let cmd = sm.decide(&empty_world(0), &map, &params());
        assert_eq!(sm.state(), RobotState::WallFollow);
        assert_eq!(cmd, DriveCommand::new(60, 90));
    }

    #[test]
    fn test_avoidance_clears_by_distance() {
        let mut sm = started();
        let map = TrackMap::new();
        sm.decide(&pillar_world(BlobColor::Green, -5.0, 400.0), &map, &params());

        // Keep the pillar visible; hysteresis holds for 25 frames
        for _ in 0..25 {
            sm.decide(&pillar_world(BlobColor::Green, -5.0, 400.0), &map, &params());
            assert_eq!(sm.state(), RobotState::AvoidPillar);
        }

        // Now far behind the clear distance
        sm.decide(&pillar_world(BlobColor::Green, -5.0, 700.0), &map, &params());
        assert_eq!(sm.state(), RobotState::WallFollow);
    }

    #[test]
    fn test_avoidance_clears_by_angle() {
        let mut sm = started();
        let map = TrackMap::new();
        sm.decide(&pillar_world(BlobColor::Red, 10.0, 400.0), &map, &params());

        for _ in 0..25 {
            sm.decide(&pillar_world(BlobColor::Red, 10.0, 400.0), &map, &params());
        }

        // Well off to the side: outside the body half-width
        sm.decide(&pillar_world(BlobColor::Red, 70.0, 400.0), &map, &params());
        assert_eq!(sm.state(), RobotState::WallFollow);
    }

    #[test]
    fn test_corner_transition_and_output() {
        let mut sm = started();
        let cmd = sm.decide(&corner_world(1000), &TrackMap::new(), &params());
        assert_eq!(sm.state(), RobotState::Corner);
        assert_eq!(cmd, DriveCommand::new(35, 115));
    }

    #[test]
    fn test_pillar_overrides_corner() {
        let mut sm = started();
        let map = TrackMap::new();
        sm.decide(&corner_world(1000), &map, &params());

        let mut world = corner_world(1000);
        world.pillars.push(Pillar {
            color: BlobColor::Green,
            angle: 5.0,
            distance: 400.0,
        });
        sm.decide(&world, &map, &params());
        assert_eq!(sm.state(), RobotState::AvoidPillar);
    }

    /// Runs enter/exit through one corner at the given encoder position.
    fn pass_corner(sm: &mut StateMachine, map: &TrackMap, encoder: i64) {
        sm.decide(&corner_world(encoder), map, &params());
        sm.decide(&empty_world(encoder + 200), map, &params());
    }

    #[test]
    fn test_race_completes_after_target_laps() {
        let mut sm = started();
        let map = TrackMap::new();

        for corner in 0..12 {
            pass_corner(&mut sm, &map, corner * 1000);
        }

        assert_eq!(sm.lap_count(), 3);
        assert_eq!(sm.state(), RobotState::Done);

        // Done is terminal
        let cmd = sm.decide(&corner_world(13_000), &map, &params());
        assert_eq!(cmd, DriveCommand::stop(90));
        assert_eq!(sm.state(), RobotState::Done);
    }

    #[test]
    fn test_corner_flicker_counts_once() {
        let mut sm = started();
        let map = TrackMap::new();

        // The same physical corner flickers twice within the spacing
        sm.decide(&corner_world(1000), &map, &params());
        sm.decide(&empty_world(1020), &map, &params());
        sm.decide(&corner_world(1040), &map, &params());
        sm.decide(&empty_world(1060), &map, &params());

        pass_corner(&mut sm, &map, 2000);
        pass_corner(&mut sm, &map, 3000);
        pass_corner(&mut sm, &map, 4000);

        assert_eq!(sm.lap_count(), 1);
    }

    #[test]
    fn test_parking_flow() {
        let mut sm = started();

        // Map with a known parking zone
        let mut map = TrackMap::new();
        let mut marker_world = empty_world(50);
        marker_world.parking_marker = Some(900.0);
        map.update(&marker_world);
        assert!(map.parking_zone().is_some());

        for corner in 0..12 {
            pass_corner(&mut sm, &map, corner * 1000);
        }
        // Parking zone known: keep driving instead of finishing
        assert_eq!(sm.lap_count(), 3);
        assert_eq!(sm.state(), RobotState::WallFollow);

        // Marker comes into view on the final lap
        let mut world = empty_world(12_400);
        world.parking_marker = Some(800.0);
        sm.decide(&world, &map, &params());
        assert_eq!(sm.state(), RobotState::Parking);

        // Placeholder maneuver completes immediately
        sm.decide(&world, &map, &params());
        assert_eq!(sm.state(), RobotState::Done);
    }

    #[test]
    fn test_direction_latched_from_map() {
        let mut sm = started();
        let mut map = TrackMap::new();
        map.update(&corner_world(500));

        sm.decide(&empty_world(600), &map, &params());
        assert_eq!(sm.direction(), Some(TrackDirection::Clockwise));
    }

    #[test]
    fn test_decide_is_deterministic() {
        let worlds: Vec<WorldState> = vec![
            empty_world(0),
            pillar_world(BlobColor::Red, 12.0, 500.0),
            empty_world(100),
            corner_world(1000),
            empty_world(1200),
        ];

        let run = || {
            let mut sm = started();
            let map = TrackMap::new();
            worlds
                .iter()
                .map(|w| sm.decide(w, &map, &params()))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }
}
