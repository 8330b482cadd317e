//! TrackPilot Core - Perception, Mapping, and Decision for a Track Vehicle
//!
//! This library is the brain of an autonomous model vehicle on a walled
//! track with colored obstacle pillars. It solves four coupled problems:
//! 1. **Color without range**: the camera sees colored blobs but cannot
//!    measure distance - fused against LIDAR clusters by angle.
//! 2. **Range without color**: LIDAR clusters have metric width and
//!    distance but no identity - confirmed only when a blob matches.
//! 3. **A track learned, not given**: corners, corridor widths, pillars,
//!    and the parking zone are recorded during lap 1 and queried on
//!    laps 2-3 via the wheel encoder as the arc-length coordinate.
//! 4. **One command per tick**: a priority state machine with transition
//!    hysteresis dispatches to swappable strategies and produces a single
//!    `(speed, steering)` output for the downstream motor controller.

pub mod blob;
pub mod clustering;
pub mod fusion;
pub mod metrics;
pub mod params;
pub mod protocol;
pub mod scan;
pub mod sources;
pub mod state_machine;
pub mod strategies;
pub mod track_map;
pub mod walls;
pub mod world_state;

// Re-export key types for convenience
pub use blob::{BlobColor, ColorBlob};
pub use clustering::{Clustering, DetectedObject, ObjectKind, RasterClustering, SweepClustering};
pub use fusion::{FusionConfig, SensorFusion};
pub use metrics::{Odometry, OdometryReport, TickStats};
pub use params::{ParamStore, Parameters, ParamsError};
pub use protocol::{Command, LineReader, ProtocolError, Status};
pub use scan::{Scan, ScanFilter};
pub use sources::{BlobSource, EncoderSource, ScanSource};
pub use state_machine::{MachineConfig, RobotState, StateMachine};
pub use strategies::{
    AvoidanceStrategy, CornerStrategy, CornerTurn, DriveCommand, HoldParking, ParkingStrategy,
    ProportionalAvoidance, ProportionalWallFollow, WallFollowStrategy,
};
pub use track_map::{Corner, PillarRecord, Section, TrackDirection, TrackMap};
pub use walls::{ClusterWalls, WallDetection, WindowAverageWalls};
pub use world_state::{Pillar, Side, Turn, WallInfo, WorldState};
