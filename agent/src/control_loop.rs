//! The fixed-rate control tick loop.
//!
//! Each tick: snapshot parameters, fuse the latest sensor snapshots into
//! a `WorldState`, publish it for observers, update the track map, ask
//! the state machine for a command, and write it into the shared drive
//! target. The keepalive task handles actual transmission, so a slow
//! tick (clustering spikes) never starves the downstream watchdog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use trackpilot_core::fusion::{FusionConfig, SensorFusion};
use trackpilot_core::clustering::{SweepClustering, SweepConfig};
use trackpilot_core::{
    BlobSource, ClusterWalls, EncoderSource, ParamStore, Parameters, RasterClustering,
    RobotState, ScanFilter, ScanSource, StateMachine, TickStats, TrackMap, WorldState,
};
use trackpilot_env::{DriveTarget, Latest, RobotContext};

/// Everything the loop needs, wired by main.
pub struct ControlLoop<Ctx: RobotContext> {
    pub ctx: Arc<Ctx>,
    pub scans: Arc<dyn ScanSource>,
    pub blobs: Arc<dyn BlobSource>,
    pub encoder: Box<dyn EncoderSource>,
    pub target: Arc<DriveTarget>,
    pub params: Arc<ParamStore>,

    /// Latest world state for observers (debug tooling)
    pub observer: Arc<Latest<WorldState>>,

    /// Cleared by the signal handler to stop the race
    pub running: Arc<AtomicBool>,
}

impl<Ctx: RobotContext> ControlLoop<Ctx> {
    /// Runs until `Done` or shutdown. Returns the tick statistics.
    pub async fn run(self) -> TickStats {
        let mut machine = StateMachine::new();
        let mut track_map = TrackMap::new();
        let mut stats = TickStats::new();

        let mut params = self.params.snapshot();
        let mut fusion = build_fusion(&params);

        machine.start();
        info!("control loop entered");

        loop {
            if !self.running.load(Ordering::Acquire) {
                info!("shutdown requested");
                break;
            }

            let tick_start = self.ctx.now();

            // Fresh parameter snapshot; rebuild the fusion stack only
            // when a new one was published
            let current = self.params.snapshot();
            if !Arc::ptr_eq(&current, &params) {
                params = current;
                fusion = build_fusion(&params);
            }

            let filter = ScanFilter {
                min_distance: params.lidar_min_distance,
                max_distance: params.lidar_max_distance,
                min_quality: params.lidar_min_quality,
                forward_arc: None,
            };

            // Perception
            let scan = self.scans.scan().filtered(&filter);
            let blobs = self.blobs.blobs();
            let world = fusion.fuse(&scan, &blobs, self.encoder.encoder(), tick_start);

            self.observer.publish(world.clone());

            // Mapping and decision
            track_map.update(&world);
            let cmd = machine.decide(&world, &track_map, &params);
            self.target.set(cmd.speed, cmd.steering);

            if machine.state() == RobotState::Done {
                info!("race complete, leaving control loop");
                break;
            }

            // Hold the tick rate, absorbing any negative slack
            let period = Duration::from_secs_f64(1.0 / params.control_loop_hz as f64);
            let elapsed = self.ctx.now().saturating_sub(tick_start);
            stats.record(elapsed, period);
            if stats.ticks() % (params.control_loop_hz as u64 * 5) == 0 {
                info!(
                    state = ?machine.state(),
                    lap = machine.lap_count(),
                    encoder = world.encoder_pos,
                    mean_tick_ms = stats.mean_tick_secs() * 1000.0,
                    overruns = stats.overruns(),
                    "loop stats"
                );
            }
            self.ctx.sleep(period.saturating_sub(elapsed)).await;
        }

        // Whatever ended the loop, the vehicle stops
        self.target.force_stop(params.steering_center);
        stats
    }
}

/// Builds the fusion stack from a parameter snapshot.
///
/// Cluster-based wall extraction (pillar-robust) over raster clustering;
/// the sweep clusterer feeds pillar matching.
fn build_fusion(params: &Parameters) -> SensorFusion {
    let config = FusionConfig {
        angle_match_threshold: params.angle_match_threshold,
        pillar_size_min: params.pillar_size_min,
        pillar_size_max: params.pillar_size_max,
        corner_threshold: params.corner_threshold,
        camera_lidar_yaw_offset: params.camera_lidar_yaw_offset,
        ..FusionConfig::default()
    };
    let clustering = SweepClustering::new(SweepConfig {
        angle_gap: params.cluster_angle_gap,
        distance_diff: params.cluster_distance_diff,
        min_points: params.cluster_min_points,
        pillar_max_width: params.pillar_max_width,
    });
    SensorFusion::new(
        config,
        Box::new(ClusterWalls::new(
            Box::new(RasterClustering::default()),
            45.0,
        )),
        Box::new(clustering),
    )
}
