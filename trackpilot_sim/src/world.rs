//! Simulated track world - geometry ground truth.
//!
//! The arena is a square corridor: an outer wall box and an inner wall
//! box, with colored pillars standing in the corridor and an optional
//! parking marker. The world ray-casts LIDAR scans, projects camera
//! blobs, integrates the robot pose from the decided command, and
//! accumulates the encoder from arc length.
//!
//! Coordinates are millimeters. Bearings are degrees, 0 = +Y, clockwise
//! positive, matching the LIDAR frame (0 forward, 90 right).

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::time::Duration;
use trackpilot_core::{BlobColor, ColorBlob, DriveCommand, Scan};

/// Robot pose in world coordinates.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RobotPose {
    pub x: f32,
    pub y: f32,

    /// Bearing of the robot's forward axis, degrees
    pub heading: f32,
}

/// A wall segment.
#[derive(Debug, Clone, Copy)]
struct Segment {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

/// A pillar standing in the corridor.
#[derive(Debug, Clone, Copy)]
pub struct SimPillar {
    pub x: f32,
    pub y: f32,
    pub color: BlobColor,
}

/// World geometry and sensor model tuning.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Outer wall half-size (the arena is 2x this per side)
    pub outer_half: f32,

    /// Inner wall half-size; the corridor is the gap between boxes
    pub inner_half: f32,

    pub pillar_radius: f32,

    /// Gaussian range noise sigma, mm
    pub range_noise_std: f32,

    pub max_range: f32,

    /// Camera half field of view, degrees
    pub camera_half_fov: f32,

    /// Blobs beyond this range are too small to threshold
    pub camera_range: f32,

    /// mm/s of ground speed per drive speed unit
    pub speed_scale: f32,

    /// Axle distance for the steering model, mm
    pub wheelbase: f32,

    /// Encoder resolution
    pub ticks_per_mm: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            outer_half: 1500.0,
            inner_half: 500.0,
            pillar_radius: 25.0,
            range_noise_std: 3.0,
            max_range: 3000.0,
            camera_half_fov: 35.0,
            camera_range: 2500.0,
            speed_scale: 10.0,
            wheelbase: 150.0,
            ticks_per_mm: 1.0,
        }
    }
}

/// The simulated arena plus robot state.
pub struct TrackWorld {
    config: WorldConfig,
    walls: Vec<Segment>,
    pillars: Vec<SimPillar>,
    parking_marker: Option<(f32, f32)>,
    pose: RobotPose,
    encoder_mm: f64,
    rng: ChaCha8Rng,
    noise: Normal<f32>,
}

impl TrackWorld {
    /// Builds the arena. The robot starts on the south corridor midline
    /// heading east, which circulates counterclockwise.
    pub fn new(config: WorldConfig, seed: u64) -> Self {
        let o = config.outer_half;
        let i = config.inner_half;
        let walls = vec![
            // Outer box
            Segment { x1: -o, y1: -o, x2: o, y2: -o },
            Segment { x1: o, y1: -o, x2: o, y2: o },
            Segment { x1: o, y1: o, x2: -o, y2: o },
            Segment { x1: -o, y1: o, x2: -o, y2: -o },
            // Inner box
            Segment { x1: -i, y1: -i, x2: i, y2: -i },
            Segment { x1: i, y1: -i, x2: i, y2: i },
            Segment { x1: i, y1: i, x2: -i, y2: i },
            Segment { x1: -i, y1: i, x2: -i, y2: -i },
        ];
        let start = RobotPose {
            x: 0.0,
            y: -(o + i) / 2.0,
            heading: 90.0,
        };
        let noise = Normal::new(0.0, config.range_noise_std.max(f32::EPSILON))
            .unwrap_or_else(|_| Normal::new(0.0, 1.0).unwrap());
        Self {
            config,
            walls,
            pillars: Vec::new(),
            parking_marker: None,
            pose: start,
            encoder_mm: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise,
        }
    }

    pub fn add_pillar(&mut self, x: f32, y: f32, color: BlobColor) {
        self.pillars.push(SimPillar { x, y, color });
    }

    pub fn set_parking_marker(&mut self, x: f32, y: f32) {
        self.parking_marker = Some((x, y));
    }

    pub fn pose(&self) -> RobotPose {
        self.pose
    }

    pub fn encoder(&self) -> i64 {
        (self.encoder_mm * self.config.ticks_per_mm as f64) as i64
    }

    // =========================================================================
    // Sensor models
    // =========================================================================

    /// Ray-casts a full 360-degree scan from the current pose.
    pub fn cast_scan(&mut self, timestamp: Duration) -> Scan {
        let mut scan = Scan::new(timestamp);
        for angle in 0..360u16 {
            let bearing = self.pose.heading + angle as f32;
            if let Some(distance) = self.cast_ray(bearing, true) {
                if distance <= self.config.max_range {
                    let noisy = (distance + self.noise.sample(&mut self.rng)).max(1.0);
                    scan.insert(angle, noisy, 55);
                }
            }
        }
        scan
    }

    /// Projects pillars and the parking marker into camera blobs.
    ///
    /// A target is visible when inside the FOV cone, within camera range,
    /// and not hidden behind a wall.
    pub fn project_blobs(&self) -> Vec<ColorBlob> {
        let mut targets: Vec<(f32, f32, BlobColor)> = self
            .pillars
            .iter()
            .map(|p| (p.x, p.y, p.color))
            .collect();
        if let Some((x, y)) = self.parking_marker {
            targets.push((x, y, BlobColor::Magenta));
        }

        let mut blobs = Vec::new();
        for (tx, ty, color) in targets {
            let dx = tx - self.pose.x;
            let dy = ty - self.pose.y;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance > self.config.camera_range || distance < 1.0 {
                continue;
            }

            let bearing = dx.atan2(dy).to_degrees();
            let relative = wrap_signed(bearing - self.pose.heading);
            if relative.abs() > self.config.camera_half_fov {
                continue;
            }

            // Occluded behind a wall?
            if let Some(wall) = self.cast_ray(bearing, false) {
                if wall + self.config.pillar_radius < distance {
                    continue;
                }
            }

            // Pinhole-ish appearance model: 500 px focal, 50 mm target
            let apparent = 500.0 * 50.0 / distance.max(100.0);
            let pixel_x = (320.0 + relative / self.config.camera_half_fov * 320.0)
                .clamp(0.0, 639.0) as u32;
            blobs.push(ColorBlob {
                color,
                angle: relative,
                pixel_x,
                pixel_y: 240,
                pixel_w: apparent as u32,
                pixel_h: (apparent * 2.0) as u32,
                area_px: (apparent * apparent * 2.0) as u32,
            });
        }
        blobs
    }

    /// Nearest obstacle along a bearing; optionally including pillars.
    fn cast_ray(&self, bearing: f32, include_pillars: bool) -> Option<f32> {
        let rad = bearing.to_radians();
        let (dx, dy) = (rad.sin(), rad.cos());
        let (ox, oy) = (self.pose.x, self.pose.y);

        let mut nearest: Option<f32> = None;
        let mut consider = |t: f32| {
            if t > 0.0 && nearest.map_or(true, |n| t < n) {
                nearest = Some(t);
            }
        };

        for seg in &self.walls {
            let sx = seg.x2 - seg.x1;
            let sy = seg.y2 - seg.y1;
            let denom = dx * sy - dy * sx;
            if denom.abs() < 1e-9 {
                continue;
            }
            let qx = seg.x1 - ox;
            let qy = seg.y1 - oy;
            let t = (qx * sy - qy * sx) / denom;
            let s = (qx * dy - qy * dx) / denom;
            if t > 0.0 && (0.0..=1.0).contains(&s) {
                consider(t);
            }
        }

        if include_pillars {
            for pillar in &self.pillars {
                let cx = pillar.x - ox;
                let cy = pillar.y - oy;
                let proj = dx * cx + dy * cy;
                if proj <= 0.0 {
                    continue;
                }
                let closest2 = (cx * cx + cy * cy) - proj * proj;
                let r2 = self.config.pillar_radius * self.config.pillar_radius;
                if closest2 <= r2 {
                    consider(proj - (r2 - closest2).sqrt());
                }
            }
        }

        nearest
    }

    /// Shortest distance from the pose to any wall (collision metric).
    pub fn clearance(&self) -> f32 {
        self.walls
            .iter()
            .map(|seg| point_segment_distance(self.pose.x, self.pose.y, seg))
            .fold(f32::INFINITY, f32::min)
    }

    // =========================================================================
    // Actuation model
    // =========================================================================

    /// Integrates the pose over `dt` under the decided command.
    ///
    /// Bicycle model: the steering offset from center maps to a front
    /// wheel angle; heading rate is v/L * tan(delta).
    pub fn apply_command(&mut self, cmd: DriveCommand, dt: f32) {
        let v = cmd.speed as f32 * self.config.speed_scale;
        let delta = (cmd.steering as i32 - 90) as f32;

        let yaw_rate =
            (v / self.config.wheelbase) * delta.to_radians().tan();
        self.pose.heading = wrap_signed(self.pose.heading + yaw_rate.to_degrees() * dt);

        let rad = self.pose.heading.to_radians();
        self.pose.x += v * rad.sin() * dt;
        self.pose.y += v * rad.cos() * dt;
        self.encoder_mm += (v * dt) as f64;
    }
}

/// Wraps degrees into [-180, 180).
fn wrap_signed(angle: f32) -> f32 {
    let mut a = angle.rem_euclid(360.0);
    if a >= 180.0 {
        a -= 360.0;
    }
    a
}

fn point_segment_distance(px: f32, py: f32, seg: &Segment) -> f32 {
    let sx = seg.x2 - seg.x1;
    let sy = seg.y2 - seg.y1;
    let len2 = sx * sx + sy * sy;
    let t = if len2 <= f32::EPSILON {
        0.0
    } else {
        (((px - seg.x1) * sx + (py - seg.y1) * sy) / len2).clamp(0.0, 1.0)
    };
    let cx = seg.x1 + t * sx;
    let cy = seg.y1 + t * sy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}
