//! End-to-end perception -> decision fixtures.
//!
//! Each test feeds a hand-built scan (and blobs) through fusion and the
//! state machine, checking the single command that comes out the other
//! end.

use std::time::Duration;

use trackpilot_core::fusion::{FusionConfig, SensorFusion};
use trackpilot_core::{
    BlobColor, ColorBlob, DriveCommand, Parameters, RobotState, Scan, StateMachine,
    SweepClustering, TrackMap, WindowAverageWalls,
};

fn fusion() -> SensorFusion {
    SensorFusion::new(
        FusionConfig::default(),
        Box::new(WindowAverageWalls::default()),
        Box::new(SweepClustering::default()),
    )
}

fn arc(scan: &mut Scan, from: u16, to: u16, distance: f32) {
    let mut a = from % 360;
    loop {
        scan.insert(a, distance, 50);
        if a == to % 360 {
            break;
        }
        a = (a + 1) % 360;
    }
}

#[test]
fn empty_world_drives_straight() {
    let f = fusion();
    let mut sm = StateMachine::new();
    sm.start();

    let world = f.fuse(&Scan::new(Duration::ZERO), &[], 0, Duration::ZERO);
    assert!(world.pillars.is_empty());
    assert!(world.walls.corridor_width().is_none());

    let cmd = sm.decide(&world, &TrackMap::new(), &Parameters::default());
    assert_eq!(cmd, DriveCommand::new(60, 90));
}

#[test]
fn centered_corridor_steers_center() {
    let mut scan = Scan::new(Duration::ZERO);
    arc(&mut scan, 260, 280, 400.0); // left wall
    arc(&mut scan, 80, 100, 400.0); // right wall
    arc(&mut scan, 355, 5, 2000.0); // front, far

    let f = fusion();
    let world = f.fuse(&scan, &[], 0, Duration::ZERO);
    assert_eq!(world.corridor_width(), Some(800.0));
    assert!(world.corner_ahead.is_none());

    let mut sm = StateMachine::new();
    sm.start();
    let cmd = sm.decide(&world, &TrackMap::new(), &Parameters::default());
    assert_eq!(cmd, DriveCommand::new(60, 90));
}

#[test]
fn red_pillar_triggers_avoidance() {
    let mut scan = Scan::new(Duration::ZERO);
    arc(&mut scan, 7, 13, 500.0); // pillar-sized cluster at ~10 deg

    let blobs = vec![ColorBlob::at(BlobColor::Red, 12.0, 1200)];
    let f = fusion();
    let world = f.fuse(&scan, &blobs, 0, Duration::ZERO);

    assert_eq!(world.pillars.len(), 1);
    assert_eq!(world.pillars[0].distance, 500.0);

    let mut sm = StateMachine::new();
    sm.start();
    let cmd = sm.decide(&world, &TrackMap::new(), &Parameters::default());

    assert_eq!(sm.state(), RobotState::AvoidPillar);
    assert_eq!(cmd, DriveCommand::new(35, 34));
}

#[test]
fn first_lap_maps_four_corners() {
    let f = fusion();
    let mut map = TrackMap::new();

    // Four corner approaches, each: near front wall, open right side
    for lap_pos in 0..4i64 {
        let mut scan = Scan::new(Duration::ZERO);
        arc(&mut scan, 355, 5, 300.0);
        arc(&mut scan, 75, 105, 1000.0); // open to the right
        arc(&mut scan, 255, 285, 350.0);

        let world = f.fuse(&scan, &[], lap_pos * 1500, Duration::ZERO);
        assert!(world.corner_ahead.is_some());
        map.update(&world);
    }

    assert!(map.first_lap_complete());
    assert_eq!(map.lap_length(), Some(4500));
    assert_eq!(map.corner_count(), 4);

    // Queries wrap on later laps
    let (dist, _) = map.next_corner(4500 + 1000).unwrap();
    assert_eq!(dist, 500);
}
