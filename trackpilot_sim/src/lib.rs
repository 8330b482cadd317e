//! TrackPilot Deterministic Simulation Harness
//!
//! This crate runs the entire perception -> decision -> actuation pipeline
//! against a simulated track, with every source of non-determinism derived
//! from a single 64-bit seed. Any failing run reproduces from its seed.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                        │
//! │  ┌─────────────┐   scan/blobs/encoder   ┌──────────────┐  │
//! │  │  TrackWorld │ ─────────────────────► │   Pipeline   │  │
//! │  │ (ray-cast   │                        │ fuse → map → │  │
//! │  │  geometry)  │ ◄───────────────────── │    decide    │  │
//! │  └─────────────┘    (speed, steering)   └──────────────┘  │
//! │         │                                      │          │
//! │  ┌──────▼──────────────────────────────────────▼───────┐  │
//! │  │                      Oracle                         │  │
//! │  │       (per-tick pipeline invariant auditor)         │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The world ray-casts each LIDAR degree against the corridor walls and
//! pillar discs, projects pillars into camera blobs, integrates the
//! robot's pose from the decided command, and accumulates the encoder
//! from arc length - closing the loop the real hardware closes.

pub mod context;
pub mod oracle;
pub mod runner;
pub mod scenarios;
pub mod sensors;
pub mod world;

pub use context::SimContext;
pub use oracle::Oracle;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SimFrame};
pub use scenarios::ScenarioId;
pub use sensors::{SimBlobSource, SimEncoder, SimScanSource};
pub use world::{RobotPose, TrackWorld, WorldConfig};
