//! 360-degree range scan snapshot.
//!
//! A `Scan` maps integer degrees to millimeter distances, with 0 pointing
//! forward, 90 right, 180 rear, 270 left. Missing keys mean "no valid
//! reading this rotation". A parallel quality map records acquisition
//! confidence per angle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Converts a LIDAR angle (0-360) to signed degrees, forward = 0,
/// negative = left, positive = right.
pub fn signed_degrees(angle: u16) -> f32 {
    let a = (angle % 360) as f32;
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Filter applied when copying a scan out of the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanFilter {
    /// Readings closer than this are sensor artifacts (the robot's own body)
    pub min_distance: f32,

    /// Readings beyond this are outside the arena
    pub max_distance: f32,

    /// Minimum acquisition quality; 0 disables the gate
    pub min_quality: u8,

    /// Optional forward arc limit in signed degrees (instant mode only)
    pub forward_arc: Option<f32>,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            min_distance: 60.0,
            max_distance: 3000.0,
            min_quality: 10,
            forward_arc: None,
        }
    }
}

/// One full-rotation range snapshot.
///
/// Immutable once published by the scan provider; every consumer in a tick
/// works from the same snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Scan {
    /// angle (0-359) -> distance in mm
    points: BTreeMap<u16, f32>,

    /// angle (0-359) -> acquisition quality
    quality: BTreeMap<u16, u8>,

    /// Monotonic time the rotation completed
    pub timestamp: Duration,
}

impl Scan {
    /// Creates an empty scan (before the first full rotation).
    pub fn new(timestamp: Duration) -> Self {
        Self {
            points: BTreeMap::new(),
            quality: BTreeMap::new(),
            timestamp,
        }
    }

    /// Inserts one reading. The angle is normalized into 0-359.
    pub fn insert(&mut self, angle: u16, distance_mm: f32, quality: u8) {
        let angle = angle % 360;
        self.points.insert(angle, distance_mm);
        self.quality.insert(angle, quality);
    }

    /// Distance at an exact angle, if a reading exists.
    pub fn get(&self, angle: u16) -> Option<f32> {
        self.points.get(&(angle % 360)).copied()
    }

    /// Quality at an exact angle.
    pub fn quality_at(&self, angle: u16) -> Option<u8> {
        self.quality.get(&(angle % 360)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Iterates readings in ascending angle order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, f32)> + '_ {
        self.points.iter().map(|(a, d)| (*a, *d))
    }

    /// Mean distance in a wrapping window around `center` (inclusive on
    /// both sides). Returns `None` when no angle in the window has a
    /// reading.
    pub fn window_mean(&self, center: u16, half_width: u16) -> Option<f32> {
        let mut sum = 0.0;
        let mut count = 0u32;
        let center = center as i32;
        let half = half_width as i32;
        for offset in -half..=half {
            let angle = (center + offset).rem_euclid(360) as u16;
            if let Some(d) = self.points.get(&angle) {
                sum += d;
                count += 1;
            }
        }
        if count == 0 {
            None
        } else {
            Some(sum / count as f32)
        }
    }

    /// Returns a copy with the filter applied.
    ///
    /// Drops readings outside the distance band, below the quality gate,
    /// and (when a forward arc is set) outside the signed-angle arc.
    pub fn filtered(&self, filter: &ScanFilter) -> Scan {
        let mut out = Scan::new(self.timestamp);
        for (&angle, &distance) in &self.points {
            if distance < filter.min_distance || distance > filter.max_distance {
                continue;
            }
            let quality = self.quality.get(&angle).copied().unwrap_or(0);
            if filter.min_quality > 0 && quality < filter.min_quality {
                continue;
            }
            if let Some(arc) = filter.forward_arc {
                let signed = signed_degrees(angle);
                if signed < -arc || signed > arc {
                    continue;
                }
            }
            out.insert(angle, distance, quality);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scan_with(points: &[(u16, f32)]) -> Scan {
        let mut scan = Scan::new(Duration::ZERO);
        for &(a, d) in points {
            scan.insert(a, d, 50);
        }
        scan
    }

    #[test]
    fn test_signed_degrees() {
        assert_relative_eq!(signed_degrees(0), 0.0);
        assert_relative_eq!(signed_degrees(90), 90.0);
        assert_relative_eq!(signed_degrees(180), 180.0);
        assert_relative_eq!(signed_degrees(270), -90.0);
        assert_relative_eq!(signed_degrees(350), -10.0);
    }

    #[test]
    fn test_window_mean_wraps_through_zero() {
        let scan = scan_with(&[(358, 100.0), (0, 200.0), (2, 300.0)]);
        let mean = scan.window_mean(0, 5).unwrap();
        assert_relative_eq!(mean, 200.0);
    }

    #[test]
    fn test_window_mean_empty_window() {
        let scan = scan_with(&[(90, 400.0)]);
        assert!(scan.window_mean(270, 10).is_none());
    }

    #[test]
    fn test_filter_distance_band() {
        let scan = scan_with(&[(0, 30.0), (10, 500.0), (20, 5000.0)]);
        let filtered = scan.filtered(&ScanFilter::default());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get(10), Some(500.0));
    }

    #[test]
    fn test_filter_quality_gate() {
        let mut scan = Scan::new(Duration::ZERO);
        scan.insert(0, 500.0, 5);
        scan.insert(1, 500.0, 50);
        let filtered = scan.filtered(&ScanFilter::default());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get(1), Some(500.0));
    }

    #[test]
    fn test_filter_forward_arc() {
        let scan = scan_with(&[(0, 500.0), (90, 500.0), (180, 500.0), (270, 500.0)]);
        let filter = ScanFilter {
            forward_arc: Some(95.0),
            ..ScanFilter::default()
        };
        let filtered = scan.filtered(&filter);
        // 180 is outside +-95, 270 (= -90) is inside
        assert_eq!(filtered.len(), 3);
        assert!(filtered.get(180).is_none());
        assert!(filtered.get(270).is_some());
    }
}
