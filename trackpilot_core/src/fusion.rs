//! Sensor fusion - combines LIDAR and camera into a `WorldState`.
//!
//! The camera knows COLORS but not DISTANCES. The LIDAR knows DISTANCES
//! but not COLORS. Fusion cross-references them by angle:
//!
//! ```text
//! Camera:  "red blob at +12 deg"
//! LIDAR:   "pillar-sized cluster at +10 deg, 500 mm"
//!            -> angles agree, size fits a pillar
//! Fusion:  Pillar { color: Red, angle: +12, distance: 500 }
//! ```
//!
//! A blob without a matching cluster might be a spectator's jacket; a
//! cluster without a blob might be a stray box. Neither becomes a pillar.
//!
//! Fusion is a pure function of its inputs and never fails: missing
//! sensors degrade to empty `WorldState` fields.

use crate::blob::{BlobColor, ColorBlob};
use crate::clustering::{Clustering, DetectedObject, ObjectKind, RasterClustering};
use crate::scan::Scan;
use crate::walls::{ClusterWalls, WallDetection};
use crate::world_state::{Pillar, Turn, WorldState};
use std::time::Duration;
use tracing::debug;

/// Configuration for sensor fusion.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Maximum camera/LIDAR angular disagreement for a pillar match, degrees
    pub angle_match_threshold: f32,

    /// Cluster width band accepted as a pillar candidate, mm
    pub pillar_size_min: f32,
    pub pillar_size_max: f32,

    /// Front distance below which a corner is declared, mm
    pub corner_threshold: f32,

    /// Yaw of the camera axis relative to the LIDAR zero, degrees.
    /// No extrinsic calibration is performed; this is a tuned offset.
    pub camera_lidar_yaw_offset: f32,

    /// Half-window for parking marker ranging, degrees
    pub parking_window: u16,

    /// Marker distance reported when no LIDAR return exists in the window
    pub parking_fallback: f32,

    /// Corner detector windows, degrees
    pub front_window: u16,
    pub side_window: u16,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            angle_match_threshold: 40.0,
            pillar_size_min: 30.0,
            pillar_size_max: 1000.0,
            corner_threshold: 400.0,
            camera_lidar_yaw_offset: 0.0,
            parking_window: 5,
            parking_fallback: 1500.0,
            front_window: 5,
            side_window: 15,
        }
    }
}

/// Combines a range scan, color blobs, and the encoder into a `WorldState`.
pub struct SensorFusion {
    config: FusionConfig,
    walls: Box<dyn WallDetection>,
    clustering: Box<dyn Clustering>,
}

impl SensorFusion {
    pub fn new(
        config: FusionConfig,
        walls: Box<dyn WallDetection>,
        clustering: Box<dyn Clustering>,
    ) -> Self {
        Self {
            config,
            walls,
            clustering,
        }
    }

    /// Fuses one tick's inputs. Pure: identical inputs produce identical
    /// output.
    pub fn fuse(
        &self,
        scan: &Scan,
        blobs: &[ColorBlob],
        encoder_pos: i64,
        timestamp: Duration,
    ) -> WorldState {
        let walls = self.walls.detect_walls(scan);
        let corner_ahead = self.detect_corner(scan);
        let objects = self.clustering.find_objects(scan);
        let pillars = self.match_pillars(&objects, blobs);
        let parking_marker = self.detect_parking(scan, blobs);

        WorldState {
            timestamp,
            encoder_pos,
            walls,
            pillars,
            corner_ahead,
            parking_marker,
        }
    }

    /// Declares a corner when the front wall is close; direction is the
    /// side with more open space.
    fn detect_corner(&self, scan: &Scan) -> Option<Turn> {
        let front = scan.window_mean(0, self.config.front_window)?;
        if front >= self.config.corner_threshold {
            return None;
        }

        let left = scan.window_mean(270, self.config.side_window);
        let right = scan.window_mean(90, self.config.side_window);
        match (left, right) {
            (None, None) => None,
            (None, Some(_)) => Some(Turn::Right),
            (Some(_), None) => Some(Turn::Left),
            (Some(l), Some(r)) => Some(if l > r { Turn::Left } else { Turn::Right }),
        }
    }

    /// Projects a LIDAR cluster angle into the signed camera frame.
    fn camera_frame(&self, lidar_angle: f32) -> f32 {
        let signed = if lidar_angle > 180.0 {
            lidar_angle - 360.0
        } else {
            lidar_angle
        };
        signed - self.config.camera_lidar_yaw_offset
    }

    /// Matches red/green blobs against pillar-sized clusters.
    ///
    /// Candidate pairs are ranked by angular disagreement and assigned
    /// best-first, each blob and each cluster consumed at most once, so
    /// when two blobs contest one cluster the nearer-angle blob wins.
    fn match_pillars(&self, objects: &[DetectedObject], blobs: &[ColorBlob]) -> Vec<Pillar> {
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();

        for (b, blob) in blobs.iter().enumerate() {
            if !blob.color.is_pillar() {
                continue;
            }
            for (o, obj) in objects.iter().enumerate() {
                if obj.kind != ObjectKind::Pillar {
                    continue;
                }
                if obj.width < self.config.pillar_size_min
                    || obj.width > self.config.pillar_size_max
                {
                    continue;
                }
                let diff = (blob.angle - self.camera_frame(obj.angle)).abs();
                if diff < self.config.angle_match_threshold {
                    candidates.push((diff, b, o));
                }
            }
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut blob_used = vec![false; blobs.len()];
        let mut obj_used = vec![false; objects.len()];
        let mut pillars = Vec::new();

        for (diff, b, o) in candidates {
            if blob_used[b] || obj_used[o] {
                continue;
            }
            blob_used[b] = true;
            obj_used[o] = true;

            let blob = &blobs[b];
            let obj = &objects[o];
            debug!(
                color = %blob.color,
                angle = blob.angle,
                distance = obj.distance,
                diff,
                "pillar confirmed"
            );
            pillars.push(Pillar {
                color: blob.color,
                angle: blob.angle,
                distance: obj.distance,
            });
        }
        pillars
    }

    /// Ranges the parking marker: largest magenta blob, mean LIDAR
    /// distance in a window around its projected angle, fallback constant
    /// when the window is empty.
    fn detect_parking(&self, scan: &Scan, blobs: &[ColorBlob]) -> Option<f32> {
        let marker = blobs
            .iter()
            .filter(|b| b.color == BlobColor::Magenta)
            .max_by_key(|b| b.area_px)?;

        let lidar_signed = marker.angle + self.config.camera_lidar_yaw_offset;
        let lidar_angle = lidar_signed.rem_euclid(360.0).round() as u16 % 360;

        Some(
            scan.window_mean(lidar_angle, self.config.parking_window)
                .unwrap_or(self.config.parking_fallback),
        )
    }
}

impl Default for SensorFusion {
    fn default() -> Self {
        Self::new(
            FusionConfig::default(),
            Box::new(ClusterWalls::default()),
            Box::new(RasterClustering::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::ColorBlob;
    use crate::clustering::{ObjectKind, SweepClustering};
    use crate::walls::WindowAverageWalls;
    use approx::assert_relative_eq;

    fn fusion() -> SensorFusion {
        SensorFusion::new(
            FusionConfig::default(),
            Box::new(WindowAverageWalls::default()),
            Box::new(SweepClustering::default()),
        )
    }

    fn pillar_cluster_scan(center: u16, distance: f32) -> Scan {
        let mut scan = Scan::new(Duration::ZERO);
        // ~6 degree span reads as a ~50 mm object at 500 mm
        for a in center.saturating_sub(3)..=center + 3 {
            scan.insert(a, distance, 50);
        }
        scan
    }

    #[test]
    fn test_empty_world() {
        let world = fusion().fuse(&Scan::new(Duration::ZERO), &[], 0, Duration::ZERO);
        assert_eq!(world.walls, Default::default());
        assert!(world.pillars.is_empty());
        assert!(world.corner_ahead.is_none());
        assert!(world.parking_marker.is_none());
        assert_eq!(world.encoder_pos, 0);
    }

    #[test]
    fn test_red_pillar_confirmed() {
        let scan = pillar_cluster_scan(10, 500.0);
        let blobs = vec![ColorBlob::at(BlobColor::Red, 12.0, 900)];

        let world = fusion().fuse(&scan, &blobs, 0, Duration::ZERO);
        assert_eq!(world.pillars.len(), 1);
        let p = &world.pillars[0];
        assert_eq!(p.color, BlobColor::Red);
        assert_relative_eq!(p.angle, 12.0);
        assert_relative_eq!(p.distance, 500.0);
    }

    #[test]
    fn test_left_side_angle_reconciliation() {
        // Cluster at 350 deg LIDAR = -10 deg signed; blob at -12 deg
        let scan = pillar_cluster_scan(350, 600.0);
        let blobs = vec![ColorBlob::at(BlobColor::Green, -12.0, 700)];

        let world = fusion().fuse(&scan, &blobs, 0, Duration::ZERO);
        assert_eq!(world.pillars.len(), 1);
        assert_relative_eq!(world.pillars[0].angle, -12.0);
    }

    #[test]
    fn test_blob_without_cluster_ignored() {
        let world = fusion().fuse(
            &Scan::new(Duration::ZERO),
            &[ColorBlob::at(BlobColor::Red, 5.0, 900)],
            0,
            Duration::ZERO,
        );
        assert!(world.pillars.is_empty());
    }

    #[test]
    fn test_cluster_without_blob_ignored() {
        let scan = pillar_cluster_scan(10, 500.0);
        let world = fusion().fuse(&scan, &[], 0, Duration::ZERO);
        assert!(world.pillars.is_empty());
    }

    #[test]
    fn test_wall_cluster_not_matched() {
        // A wide wall in front of a red blob is no pillar
        let mut scan = Scan::new(Duration::ZERO);
        for a in 0..=60 {
            scan.insert(a, 500.0, 50);
        }
        let blobs = vec![ColorBlob::at(BlobColor::Red, 10.0, 900)];
        let world = fusion().fuse(&scan, &blobs, 0, Duration::ZERO);
        assert!(world.pillars.is_empty());
    }

    #[test]
    fn test_two_blobs_one_cluster_nearer_wins() {
        let scan = pillar_cluster_scan(10, 500.0);
        let blobs = vec![
            ColorBlob::at(BlobColor::Green, 25.0, 800),
            ColorBlob::at(BlobColor::Red, 11.0, 800),
        ];

        let world = fusion().fuse(&scan, &blobs, 0, Duration::ZERO);
        assert_eq!(world.pillars.len(), 1);
        assert_eq!(world.pillars[0].color, BlobColor::Red);
    }

    #[test]
    fn test_angle_beyond_threshold_rejected() {
        let scan = pillar_cluster_scan(80, 500.0);
        let blobs = vec![ColorBlob::at(BlobColor::Red, 10.0, 900)];
        let world = fusion().fuse(&scan, &blobs, 0, Duration::ZERO);
        assert!(world.pillars.is_empty());
    }

    #[test]
    fn test_corner_detection_left() {
        let mut scan = Scan::new(Duration::ZERO);
        for a in 0..=5 {
            scan.insert(a, 300.0, 50);
        }
        for a in 355..360 {
            scan.insert(a, 300.0, 50);
        }
        for a in 255..=285 {
            scan.insert(a, 1200.0, 50); // open to the left
        }
        for a in 75..=105 {
            scan.insert(a, 400.0, 50);
        }

        let world = fusion().fuse(&scan, &[], 0, Duration::ZERO);
        assert_eq!(world.corner_ahead, Some(Turn::Left));
    }

    #[test]
    fn test_no_corner_when_front_open() {
        let mut scan = Scan::new(Duration::ZERO);
        for a in 0..=5 {
            scan.insert(a, 2000.0, 50);
        }
        let world = fusion().fuse(&scan, &[], 0, Duration::ZERO);
        assert!(world.corner_ahead.is_none());
    }

    #[test]
    fn test_parking_marker_ranged_by_lidar() {
        let mut scan = Scan::new(Duration::ZERO);
        for a in 18..=26 {
            scan.insert(a, 850.0, 50);
        }
        let blobs = vec![ColorBlob::at(BlobColor::Magenta, 22.0, 1500)];

        let world = fusion().fuse(&scan, &blobs, 0, Duration::ZERO);
        assert_relative_eq!(world.parking_marker.unwrap(), 850.0);
    }

    #[test]
    fn test_parking_marker_fallback() {
        let blobs = vec![ColorBlob::at(BlobColor::Magenta, 22.0, 1500)];
        let world = fusion().fuse(&Scan::new(Duration::ZERO), &blobs, 0, Duration::ZERO);
        assert_relative_eq!(world.parking_marker.unwrap(), 1500.0);
    }

    #[test]
    fn test_largest_magenta_blob_wins() {
        let mut scan = Scan::new(Duration::ZERO);
        for a in 28..=36 {
            scan.insert(a, 700.0, 50);
        }
        let blobs = vec![
            ColorBlob::at(BlobColor::Magenta, -40.0, 300),
            ColorBlob::at(BlobColor::Magenta, 32.0, 2000),
        ];
        let world = fusion().fuse(&scan, &blobs, 0, Duration::ZERO);
        assert_relative_eq!(world.parking_marker.unwrap(), 700.0);
    }

    #[test]
    fn test_fusion_idempotent() {
        let scan = pillar_cluster_scan(10, 500.0);
        let blobs = vec![ColorBlob::at(BlobColor::Red, 12.0, 900)];
        let f = fusion();

        let a = f.fuse(&scan, &blobs, 42, Duration::from_secs(1));
        let b = f.fuse(&scan, &blobs, 42, Duration::from_secs(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_sweep_cluster_width_band() {
        // The 7-point cluster at 500 mm is ~52 mm wide - inside the band
        let scan = pillar_cluster_scan(10, 500.0);
        let objects = SweepClustering::default().find_objects(&scan);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].kind, ObjectKind::Pillar);
        assert!(objects[0].width > 30.0 && objects[0].width < 120.0);
    }
}
