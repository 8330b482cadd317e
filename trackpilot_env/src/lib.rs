//! TrackPilot Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the TrackPilot
//! pipeline to run in both **Production** (tokio, real clock) and
//! **Simulation** (virtual clock) environments.
//!
//! # Core Concept
//!
//! Everything the control pipeline touches outside its own memory goes
//! through a small seam:
//! - Time (`now()`, `sleep()`)
//! - Latest-value sensor snapshots (`Latest<T>`)
//! - The motor target shared with the keepalive task (`DriveTarget`)
//!
//! The tick loop never blocks on I/O directly; it copies snapshots out of
//! `Latest<T>` cells and writes the decided command into `DriveTarget`.
//! A seeded simulation context makes any run reproducible from its seed.
//!
//! # Example
//!
//! ```ignore
//! use trackpilot_env::{RobotContext, DriveTarget};
//!
//! async fn tick_loop<Ctx: RobotContext>(ctx: &Ctx, target: &DriveTarget) {
//!     loop {
//!         let (speed, steering) = decide();
//!         target.set(speed, steering);
//!         ctx.sleep(Duration::from_millis(20)).await;
//!     }
//! }
//! ```

mod context;
mod error;
mod tokio_impl;
mod types;

pub use context::RobotContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::{DriveTarget, Latest};
