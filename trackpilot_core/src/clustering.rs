//! LIDAR clustering - group scan points into detected objects.
//!
//! Two interchangeable approaches:
//! - `RasterClustering`: rasterize into a bird's-eye canvas, dilate,
//!   extract connected components (robust to sub-cluster gaps)
//! - `SweepClustering`: walk angles in order, group by gap (fast, simple)
//!
//! Both classify each object by physical width: real pillars are 50 mm,
//! so anything under `pillar_max_width` (120 mm, tolerating noise) is a
//! pillar candidate and everything wider is wall.

use crate::scan::Scan;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Object classification by physical width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Pillar,
    Wall,
}

/// One object found by LIDAR clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Degrees from forward, 0-360, LIDAR frame
    pub angle: f32,

    /// Distance from robot center in mm
    pub distance: f32,

    /// Estimated physical width in mm
    pub width: f32,

    pub kind: ObjectKind,
}

impl DetectedObject {
    fn classify(width: f32, pillar_max_width: f32) -> ObjectKind {
        if width < pillar_max_width {
            ObjectKind::Pillar
        } else {
            ObjectKind::Wall
        }
    }
}

/// A clustering algorithm over a range scan.
pub trait Clustering: Send + Sync {
    /// Groups scan points into detected objects.
    fn find_objects(&self, scan: &Scan) -> Vec<DetectedObject>;
}

// ============================================================================
// RASTER CLUSTERING
// ============================================================================

/// Configuration for `RasterClustering`.
#[derive(Debug, Clone)]
pub struct RasterConfig {
    /// Canvas side length in pixels (default: 500)
    pub image_size: usize,

    /// Radius covered by the canvas in mm (default: 3000)
    pub max_range: f32,

    /// Radius of the disk stamped per scan point, in pixels
    pub point_radius: i32,

    /// Square dilation kernel side (default: 7)
    pub dilate_kernel: usize,

    /// Dilation passes (default: 2)
    pub dilate_iterations: usize,

    /// Components smaller than this pixel area are noise
    pub min_area_px: usize,

    /// Width threshold separating pillars from walls, in mm
    pub pillar_max_width: f32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            image_size: 500,
            max_range: 3000.0,
            point_radius: 2,
            dilate_kernel: 7,
            dilate_iterations: 2,
            min_area_px: 20,
            pillar_max_width: 120.0,
        }
    }
}

/// Cluster LIDAR points on a bird's-eye pixel canvas.
///
/// Algorithm:
/// 1. Project each polar reading onto the canvas (robot at center,
///    forward = up) as a small filled disk
/// 2. Dilate with a square kernel to bridge sub-cluster gaps
/// 3. Extract connected components
/// 4. Back-project each component's centroid to polar; estimate physical
///    width from the bounding box
pub struct RasterClustering {
    config: RasterConfig,
}

impl RasterClustering {
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }

    fn scale(&self) -> f32 {
        (self.config.image_size as f32 / 2.0) / self.config.max_range
    }

    /// Rasterizes the scan into a binary canvas.
    fn rasterize(&self, scan: &Scan) -> Vec<u8> {
        let size = self.config.image_size;
        let center = (size / 2) as f32;
        let scale = self.scale();
        let mut canvas = vec![0u8; size * size];

        for (angle, distance) in scan.iter() {
            if distance > self.config.max_range {
                continue;
            }
            // Polar to canvas: angle 0 = up, clockwise positive
            let rad = (angle as f32).to_radians();
            let x = center + distance * rad.sin() * scale;
            let y = center - distance * rad.cos() * scale;
            self.stamp_disk(&mut canvas, Point2::new(x, y));
        }
        canvas
    }

    fn stamp_disk(&self, canvas: &mut [u8], at: Point2<f32>) {
        let size = self.config.image_size as i32;
        let r = self.config.point_radius;
        let cx = at.x.round() as i32;
        let cy = at.y.round() as i32;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && x < size && y >= 0 && y < size {
                    canvas[(y * size + x) as usize] = 1;
                }
            }
        }
    }

    /// One dilation pass with a square kernel.
    ///
    /// A square kernel is separable: a horizontal max-run followed by a
    /// vertical max-run is equivalent to the full 2D dilation.
    fn dilate_pass(&self, canvas: &[u8]) -> Vec<u8> {
        let size = self.config.image_size;
        let half = (self.config.dilate_kernel / 2) as i32;

        let mut horizontal = vec![0u8; size * size];
        for y in 0..size {
            for x in 0..size {
                let lo = (x as i32 - half).max(0) as usize;
                let hi = ((x as i32 + half) as usize).min(size - 1);
                if canvas[y * size + lo..=y * size + hi].iter().any(|&p| p != 0) {
                    horizontal[y * size + x] = 1;
                }
            }
        }

        let mut out = vec![0u8; size * size];
        for y in 0..size {
            let lo = (y as i32 - half).max(0) as usize;
            let hi = ((y as i32 + half) as usize).min(size - 1);
            for x in 0..size {
                if (lo..=hi).any(|yy| horizontal[yy * size + x] != 0) {
                    out[y * size + x] = 1;
                }
            }
        }
        out
    }

    /// Extracts 8-connected components, returning per-component pixel
    /// count, bounding box, and centroid.
    fn components(&self, canvas: &[u8]) -> Vec<Component> {
        let size = self.config.image_size;
        let mut visited = vec![false; size * size];
        let mut result = Vec::new();
        let mut stack = Vec::new();

        for start in 0..size * size {
            if canvas[start] == 0 || visited[start] {
                continue;
            }
            let mut comp = Component::new();
            stack.push(start);
            visited[start] = true;

            while let Some(idx) = stack.pop() {
                let (x, y) = (idx % size, idx / size);
                comp.add(x, y);
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= size as i32 || ny >= size as i32 {
                            continue;
                        }
                        let nidx = ny as usize * size + nx as usize;
                        if canvas[nidx] != 0 && !visited[nidx] {
                            visited[nidx] = true;
                            stack.push(nidx);
                        }
                    }
                }
            }
            result.push(comp);
        }
        result
    }
}

impl Default for RasterClustering {
    fn default() -> Self {
        Self::new(RasterConfig::default())
    }
}

impl Clustering for RasterClustering {
    fn find_objects(&self, scan: &Scan) -> Vec<DetectedObject> {
        if scan.is_empty() {
            return Vec::new();
        }

        let mut canvas = self.rasterize(scan);
        for _ in 0..self.config.dilate_iterations {
            canvas = self.dilate_pass(&canvas);
        }

        let center = (self.config.image_size / 2) as f32;
        let scale = self.scale();
        // Stamped disks and each dilation pass inflate every bounding box
        // by a fixed pixel margin; subtract it to recover physical extent.
        let growth = 2 * self.config.point_radius as usize
            + 2 * self.config.dilate_iterations * (self.config.dilate_kernel / 2);
        let mut objects = Vec::new();

        for comp in self.components(&canvas) {
            if comp.area < self.config.min_area_px {
                continue;
            }
            let centroid = comp.centroid();
            // Back-project: canvas y grows downward, world forward is up
            let offset = Vector2::new(centroid.x - center, center - centroid.y);
            let distance = offset.norm() / scale;
            let angle = offset.x.atan2(offset.y).to_degrees().rem_euclid(360.0);
            let (w, h) = comp.bbox_size();
            let width = w.max(h).saturating_sub(growth) as f32 / scale;

            objects.push(DetectedObject {
                angle,
                distance,
                width,
                kind: DetectedObject::classify(width, self.config.pillar_max_width),
            });
        }
        objects
    }
}

/// Accumulator for one connected component.
struct Component {
    area: usize,
    sum_x: u64,
    sum_y: u64,
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl Component {
    fn new() -> Self {
        Self {
            area: 0,
            sum_x: 0,
            sum_y: 0,
            min_x: usize::MAX,
            min_y: usize::MAX,
            max_x: 0,
            max_y: 0,
        }
    }

    fn add(&mut self, x: usize, y: usize) {
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Centroid of component pixels (first image moments).
    fn centroid(&self) -> Point2<f32> {
        Point2::new(
            self.sum_x as f32 / self.area as f32,
            self.sum_y as f32 / self.area as f32,
        )
    }

    fn bbox_size(&self) -> (usize, usize) {
        (self.max_x - self.min_x + 1, self.max_y - self.min_y + 1)
    }
}

// ============================================================================
// ANGULAR SWEEP CLUSTERING
// ============================================================================

/// Configuration for `SweepClustering`.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Maximum angle gap between consecutive points of one group, degrees
    pub angle_gap: u16,

    /// Maximum distance jump between consecutive points, mm
    pub distance_diff: f32,

    /// Groups with fewer points are discarded
    pub min_points: usize,

    /// Width threshold separating pillars from walls, in mm
    pub pillar_max_width: f32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            angle_gap: 5,
            distance_diff: 150.0,
            min_points: 3,
            pillar_max_width: 120.0,
        }
    }
}

/// Cluster LIDAR points by walking through angles sequentially.
///
/// Extends the current group while both the angle gap and the distance
/// jump stay within their gates; closes it otherwise. Physical width is
/// derived from the group's angular span at its mean distance.
pub struct SweepClustering {
    config: SweepConfig,
}

impl SweepClustering {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    fn emit(&self, angles: &[u16], distances: &[f32]) -> Option<DetectedObject> {
        if angles.len() < self.config.min_points {
            return None;
        }
        let n = angles.len() as f32;
        let distance = distances.iter().sum::<f32>() / n;
        let angle = angles.iter().map(|&a| a as f32).sum::<f32>() / n;
        let span = (angles[angles.len() - 1] - angles[0]) as f32;
        let width = 2.0 * distance * (span.to_radians() / 2.0).tan();

        Some(DetectedObject {
            angle: angle.rem_euclid(360.0),
            distance,
            width,
            kind: DetectedObject::classify(width, self.config.pillar_max_width),
        })
    }
}

impl Default for SweepClustering {
    fn default() -> Self {
        Self::new(SweepConfig::default())
    }
}

impl Clustering for SweepClustering {
    fn find_objects(&self, scan: &Scan) -> Vec<DetectedObject> {
        let readings: Vec<(u16, f32)> = scan.iter().collect();
        if readings.is_empty() {
            return Vec::new();
        }

        let mut objects = Vec::new();
        let mut angles = vec![readings[0].0];
        let mut distances = vec![readings[0].1];

        for window in readings.windows(2) {
            let (prev_a, prev_d) = window[0];
            let (curr_a, curr_d) = window[1];
            let gap = curr_a - prev_a;
            let jump = (curr_d - prev_d).abs();

            if gap <= self.config.angle_gap && jump < self.config.distance_diff {
                angles.push(curr_a);
                distances.push(curr_d);
            } else {
                objects.extend(self.emit(&angles, &distances));
                angles = vec![curr_a];
                distances = vec![curr_d];
            }
        }
        objects.extend(self.emit(&angles, &distances));
        objects
    }
}
