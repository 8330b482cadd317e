//! Color blob detections from the forward camera.
//!
//! Blobs are produced by the camera collaborator (HSV thresholding +
//! contour extraction) and consumed read-only here. The camera knows
//! colors but not distances; fusion pairs blobs with LIDAR clusters.

use serde::{Deserialize, Serialize};

/// Recognized blob colors.
///
/// Red and green mark obstacle pillars (red is passed on the right,
/// green on the left); magenta marks the parking zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobColor {
    Red,
    Green,
    Magenta,
}

impl BlobColor {
    /// Whether this color identifies an obstacle pillar.
    pub fn is_pillar(self) -> bool {
        matches!(self, BlobColor::Red | BlobColor::Green)
    }
}

impl std::fmt::Display for BlobColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobColor::Red => write!(f, "red"),
            BlobColor::Green => write!(f, "green"),
            BlobColor::Magenta => write!(f, "magenta"),
        }
    }
}

/// One contiguous region of a target color in the camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorBlob {
    pub color: BlobColor,

    /// Signed angle from the camera axis in degrees; positive = right.
    /// Bounded by half the camera's field of view.
    pub angle: f32,

    /// Bounding box top-left in pixels
    pub pixel_x: u32,
    pub pixel_y: u32,

    /// Bounding box size in pixels
    pub pixel_w: u32,
    pub pixel_h: u32,

    /// Contour area in pixels
    pub area_px: u32,
}

impl ColorBlob {
    /// Convenience constructor for fixtures; bbox fields default to a
    /// square patch consistent with the area.
    pub fn at(color: BlobColor, angle: f32, area_px: u32) -> Self {
        let side = (area_px as f32).sqrt() as u32;
        Self {
            color,
            angle,
            pixel_x: 0,
            pixel_y: 0,
            pixel_w: side.max(1),
            pixel_h: side.max(1),
            area_px,
        }
    }
}
