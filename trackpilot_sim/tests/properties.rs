//! Property tests over the simulated world and the pipeline contracts.

use proptest::prelude::*;
use std::time::Duration;
use trackpilot_core::fusion::{FusionConfig, SensorFusion};
use trackpilot_core::{
    DriveCommand, SweepClustering, TrackMap, Turn, WindowAverageWalls, WorldState,
};
use trackpilot_sim::{TrackWorld, WorldConfig};

fn world(seed: u64) -> TrackWorld {
    TrackWorld::new(WorldConfig::default(), seed)
}

fn fusion() -> SensorFusion {
    SensorFusion::new(
        FusionConfig::default(),
        Box::new(WindowAverageWalls::default()),
        Box::new(SweepClustering::default()),
    )
}

fn mapped_track() -> TrackMap {
    let mut map = TrackMap::new();
    for (enc, turn) in [(1000, Turn::Left), (2200, Turn::Left), (3500, Turn::Left), (4800, Turn::Left)] {
        let world = WorldState {
            encoder_pos: enc,
            corner_ahead: Some(turn),
            ..WorldState::default()
        };
        map.update(&world);
    }
    map
}

proptest! {
    #[test]
    fn scan_readings_stay_in_range(seed in 0u64..1000) {
        let mut w = world(seed);
        let scan = w.cast_scan(Duration::ZERO);
        for (_, distance) in scan.iter() {
            prop_assert!(distance > 0.0);
            prop_assert!(distance <= 3000.0 + 50.0); // range + noise headroom
        }
    }

    #[test]
    fn fusion_never_panics_on_driven_poses(
        seed in 0u64..200,
        steering in 0u8..=180,
        steps in 1usize..40,
    ) {
        let mut w = world(seed);
        let f = fusion();
        for _ in 0..steps {
            w.apply_command(DriveCommand::new(40, steering), 0.02);
        }
        let scan = w.cast_scan(Duration::ZERO);
        let blobs = w.project_blobs();
        let state = f.fuse(&scan, &blobs, w.encoder(), Duration::ZERO);
        // Walls, when present, carry plausible ranges
        for wall in [state.walls.left, state.walls.right, state.walls.front].into_iter().flatten() {
            prop_assert!(wall > 0.0);
        }
    }

    #[test]
    fn map_queries_total_over_encoders(encoder in -100_000i64..100_000) {
        let map = mapped_track();
        prop_assert!(map.first_lap_complete());

        // Queries must be safe for any encoder, wrapped or reversed
        if let Some((dist, _)) = map.next_corner(encoder) {
            prop_assert!(dist >= 0);
            prop_assert!(dist <= map.lap_length().unwrap() + 1);
        }
        let _ = map.section_width(encoder);
        let _ = map.expected_pillars(encoder, 500);
        let _ = map.distance_to_parking(encoder);
    }

    #[test]
    fn fusion_is_pure(seed in 0u64..100) {
        let mut w = world(seed);
        let f = fusion();
        let scan = w.cast_scan(Duration::ZERO);
        let blobs = w.project_blobs();

        let a = f.fuse(&scan, &blobs, 7, Duration::from_millis(3));
        let b = f.fuse(&scan, &blobs, 7, Duration::from_millis(3));
        prop_assert_eq!(a, b);
    }
}
