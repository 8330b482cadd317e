//! Wall extraction - left/right/front wall distances from a scan.
//!
//! Two approaches:
//! - `WindowAverageWalls`: average distances in a small angular window
//!   around each cardinal direction (fast, but a pillar sitting at 90
//!   degrees reads as the right wall)
//! - `ClusterWalls`: cluster the scan first, keep wall-classified objects
//!   only, pick the nearest per cardinal (pillar-robust; the default)

use crate::clustering::{Clustering, DetectedObject, ObjectKind, RasterClustering};
use crate::scan::Scan;
use crate::world_state::WallInfo;

/// A wall extraction algorithm.
pub trait WallDetection: Send + Sync {
    /// Extracts wall distances from a scan. Any side may be absent.
    fn detect_walls(&self, scan: &Scan) -> WallInfo;
}

/// Detect walls by averaging readings at fixed angles.
#[derive(Debug, Clone)]
pub struct WindowAverageWalls {
    pub left_angle: u16,
    pub right_angle: u16,
    pub front_angle: u16,
    pub side_window: u16,
    pub front_window: u16,
}

impl Default for WindowAverageWalls {
    fn default() -> Self {
        Self {
            left_angle: 270,
            right_angle: 90,
            front_angle: 0,
            side_window: 10,
            front_window: 5,
        }
    }
}

impl WallDetection for WindowAverageWalls {
    fn detect_walls(&self, scan: &Scan) -> WallInfo {
        WallInfo {
            left: scan.window_mean(self.left_angle, self.side_window),
            right: scan.window_mean(self.right_angle, self.side_window),
            front: scan.window_mean(self.front_angle, self.front_window),
        }
    }
}

/// Detect walls from clustered objects, ignoring pillar-sized clusters.
///
/// For each cardinal direction, picks the nearest-in-angle wall object
/// within the tolerance. A pillar at 90 degrees cannot contaminate the
/// right-wall estimate because clustering classifies it by width.
pub struct ClusterWalls {
    clustering: Box<dyn Clustering>,
    angle_tolerance: f32,
}

impl ClusterWalls {
    pub fn new(clustering: Box<dyn Clustering>, angle_tolerance: f32) -> Self {
        Self {
            clustering,
            angle_tolerance,
        }
    }

    fn wall_near(&self, walls: &[&DetectedObject], target: f32) -> Option<f32> {
        let mut best: Option<(f32, f32)> = None;
        for wall in walls {
            let mut diff = (wall.angle - target).abs();
            if diff > 180.0 {
                diff = 360.0 - diff;
            }
            if diff < self.angle_tolerance && best.map_or(true, |(d, _)| diff < d) {
                best = Some((diff, wall.distance));
            }
        }
        best.map(|(_, distance)| distance)
    }
}

impl Default for ClusterWalls {
    fn default() -> Self {
        Self::new(Box::new(RasterClustering::default()), 45.0)
    }
}

impl WallDetection for ClusterWalls {
    fn detect_walls(&self, scan: &Scan) -> WallInfo {
        let objects = self.clustering.find_objects(scan);
        let walls: Vec<&DetectedObject> = objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Wall)
            .collect();

        WallInfo {
            left: self.wall_near(&walls, 270.0),
            right: self.wall_near(&walls, 90.0),
            front: self.wall_near(&walls, 0.0),
        }
    }
}
