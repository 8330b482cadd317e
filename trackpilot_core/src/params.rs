//! Runtime tunable parameters with JSON persistence.
//!
//! Every layer reads from one published snapshot. An updater (parameter
//! tooling, pit-side tweaks) publishes a new snapshot through the
//! `ParamStore`; consumers grab an `Arc<Parameters>` at the start of each
//! tick and see a coherent view for the whole tick. Invalid updates are
//! rejected key-by-key with a warning; the prior value is retained.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use trackpilot_env::Latest;

/// Errors from parameter persistence.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime tunable parameters.
///
/// HSV windows use OpenCV conventions (hue 0-180). Red needs two hue
/// windows because it straddles the hue wrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    // Red range 1 (low hue end)
    pub red_h_min1: u8,
    pub red_h_max1: u8,
    pub red_s_min1: u8,
    pub red_s_max1: u8,
    pub red_v_min1: u8,
    pub red_v_max1: u8,

    // Red range 2 (high hue end)
    pub red_h_min2: u8,
    pub red_h_max2: u8,
    pub red_s_min2: u8,
    pub red_s_max2: u8,
    pub red_v_min2: u8,
    pub red_v_max2: u8,

    // Green
    pub green_h_min: u8,
    pub green_h_max: u8,
    pub green_s_min: u8,
    pub green_s_max: u8,
    pub green_v_min: u8,
    pub green_v_max: u8,

    // Magenta (parking markers)
    pub magenta_h_min: u8,
    pub magenta_h_max: u8,
    pub magenta_s_min: u8,
    pub magenta_s_max: u8,
    pub magenta_v_min: u8,
    pub magenta_v_max: u8,

    /// Minimum blob contour area in pixels
    pub min_contour_area: u32,

    // Drive calibration
    pub wheel_diameter_mm: f32,
    pub encoder_cpr: u32,

    // Speeds and steering
    pub normal_speed: i8,
    pub slow_speed: i8,
    pub steering_center: u8,

    // Wall following
    pub wall_follow_kp: f32,
    pub min_wall_clearance: f32,

    // Corner handling
    pub corner_threshold: f32,
    pub corner_turn_offset: u8,

    // LIDAR acquisition filter
    pub lidar_min_distance: f32,
    pub lidar_max_distance: f32,
    pub lidar_min_quality: u8,

    /// Publish per-point updates for the forward arc instead of waiting
    /// for a full rotation
    pub lidar_instant: bool,

    // Clustering
    pub cluster_angle_gap: u16,
    pub cluster_distance_diff: f32,
    pub cluster_min_points: usize,
    pub pillar_max_width: f32,

    // Fusion
    pub angle_match_threshold: f32,
    pub pillar_size_min: f32,
    pub pillar_size_max: f32,
    pub camera_lidar_yaw_offset: f32,

    // Avoidance
    pub min_avoid_frames: u32,
    pub clear_distance: f32,
    pub clear_angle: f32,
    pub avoid_min_steer_offset: u8,
    pub avoid_max_steer_offset: u8,
    pub avoid_max_distance: f32,
    pub avoid_angle_gain: f32,

    // Scheduling
    pub control_loop_hz: u32,
    pub keepalive_interval_ms: u64,

    // Race
    pub target_laps: u32,

    /// Servo wired inverted: emit `180 - steering` on the wire
    pub servo_inverted: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            red_h_min1: 0,
            red_h_max1: 10,
            red_s_min1: 100,
            red_s_max1: 255,
            red_v_min1: 100,
            red_v_max1: 255,
            red_h_min2: 160,
            red_h_max2: 180,
            red_s_min2: 100,
            red_s_max2: 255,
            red_v_min2: 100,
            red_v_max2: 255,
            green_h_min: 40,
            green_h_max: 80,
            green_s_min: 50,
            green_s_max: 255,
            green_v_min: 50,
            green_v_max: 255,
            magenta_h_min: 140,
            magenta_h_max: 160,
            magenta_s_min: 100,
            magenta_s_max: 255,
            magenta_v_min: 100,
            magenta_v_max: 255,
            min_contour_area: 300,
            wheel_diameter_mm: 64.0,
            encoder_cpr: 0, // 0 = uncalibrated; odometry reports raw ticks
            normal_speed: 60,
            slow_speed: 35,
            steering_center: 90,
            wall_follow_kp: 0.5,
            min_wall_clearance: 150.0,
            corner_threshold: 400.0,
            corner_turn_offset: 25,
            lidar_min_distance: 60.0,
            lidar_max_distance: 3000.0,
            lidar_min_quality: 10,
            lidar_instant: false,
            cluster_angle_gap: 5,
            cluster_distance_diff: 150.0,
            cluster_min_points: 3,
            pillar_max_width: 120.0,
            angle_match_threshold: 40.0,
            pillar_size_min: 30.0,
            pillar_size_max: 1000.0,
            camera_lidar_yaw_offset: 0.0,
            min_avoid_frames: 25,
            clear_distance: 600.0,
            clear_angle: 65.0,
            avoid_min_steer_offset: 45,
            avoid_max_steer_offset: 80,
            avoid_max_distance: 800.0,
            avoid_angle_gain: 0.8,
            control_loop_hz: 50,
            keepalive_interval_ms: 20,
            target_laps: 3,
            servo_inverted: true,
        }
    }
}

impl Parameters {
    /// Applies a set of key/value updates, field by field.
    ///
    /// Unknown keys and type-mismatched or out-of-range values are
    /// dropped with a warning; every other key still applies. Returns the
    /// number of keys applied.
    pub fn apply_updates(&mut self, updates: &serde_json::Map<String, serde_json::Value>) -> usize {
        let mut current = match serde_json::to_value(&*self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return 0,
        };

        let mut applied = 0;
        for (key, value) in updates {
            let Some(slot) = current.get(key) else {
                warn!(%key, "unknown parameter ignored");
                continue;
            };
            if std::mem::discriminant(slot) != std::mem::discriminant(value) {
                warn!(%key, ?value, "type mismatch ignored");
                continue;
            }

            // Validate each key independently: a value that does not fit
            // its field must not poison the rest of the batch.
            let prior = current.insert(key.clone(), value.clone());
            match serde_json::from_value::<Parameters>(serde_json::Value::Object(current.clone()))
            {
                Ok(_) => applied += 1,
                Err(e) => {
                    warn!(%key, ?value, error = %e, "value rejected, keeping prior");
                    if let Some(prior) = prior {
                        current.insert(key.clone(), prior);
                    }
                }
            }
        }

        if applied > 0 {
            if let Ok(mut next) =
                serde_json::from_value::<Parameters>(serde_json::Value::Object(current))
            {
                next.clamp_ranges();
                *self = next;
            }
        }
        applied
    }

    /// Clamps fields into their valid ranges, warning on corrections.
    fn clamp_ranges(&mut self) {
        if self.steering_center > 180 {
            warn!(value = self.steering_center, "steering_center clamped");
            self.steering_center = 180;
        }
        if self.control_loop_hz == 0 || self.control_loop_hz > 200 {
            warn!(value = self.control_loop_hz, "control_loop_hz clamped");
            self.control_loop_hz = self.control_loop_hz.clamp(1, 200);
        }
        if self.keepalive_interval_ms == 0 {
            warn!("keepalive_interval_ms clamped to 1");
            self.keepalive_interval_ms = 1;
        }
        if self.lidar_max_distance < self.lidar_min_distance {
            warn!("lidar distance band inverted, swapping");
            std::mem::swap(&mut self.lidar_min_distance, &mut self.lidar_max_distance);
        }
        if self.avoid_max_steer_offset < self.avoid_min_steer_offset {
            warn!("avoid steer offsets inverted, swapping");
            std::mem::swap(
                &mut self.avoid_min_steer_offset,
                &mut self.avoid_max_steer_offset,
            );
        }
    }

    /// Loads parameters from a JSON file, falling back to defaults for
    /// missing keys. A missing or unreadable file yields pure defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Parameters>(&text) {
                Ok(mut params) => {
                    params.clamp_ranges();
                    info!(path = %path.display(), "parameters loaded");
                    params
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "bad parameter file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persists parameters as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ParamsError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "parameters saved");
        Ok(())
    }
}

/// Publishes immutable parameter snapshots to all consumers.
///
/// The tick loop snapshots once per tick; an updater may publish at any
/// time without blocking readers.
pub struct ParamStore {
    current: Latest<Parameters>,
    path: Option<PathBuf>,
}

impl ParamStore {
    pub fn new(params: Parameters) -> Self {
        Self {
            current: Latest::new(params),
            path: None,
        }
    }

    /// Loads from the file (or defaults) and remembers the path for
    /// `save`.
    pub fn from_file(path: PathBuf) -> Self {
        let params = Parameters::load(&path);
        Self {
            current: Latest::new(params),
            path: Some(path),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Parameters> {
        self.current.snapshot()
    }

    /// Applies updates to a copy of the current snapshot and publishes
    /// the result. Returns the number of keys applied.
    pub fn update(&self, updates: &serde_json::Map<String, serde_json::Value>) -> usize {
        let mut next = (*self.snapshot()).clone();
        let applied = next.apply_updates(updates);
        if applied > 0 {
            self.current.publish(next);
        }
        applied
    }

    /// Persists the current snapshot, if a path is configured.
    pub fn save(&self) -> Result<(), ParamsError> {
        if let Some(path) = &self.path {
            self.snapshot().save(path)?;
        }
        Ok(())
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new(Parameters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn updates(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_defaults_match_protocol_ranges() {
        let p = Parameters::default();
        assert!(p.normal_speed <= 100);
        assert!(p.steering_center <= 180);
        assert_eq!(p.control_loop_hz, 50);
        assert_eq!(p.min_avoid_frames, 25);
    }

    #[test]
    fn test_apply_known_key() {
        let mut p = Parameters::default();
        let n = p.apply_updates(&updates(json!({"normal_speed": 45})));
        assert_eq!(n, 1);
        assert_eq!(p.normal_speed, 45);
    }

    #[test]
    fn test_unknown_key_ignored() {
        let mut p = Parameters::default();
        let n = p.apply_updates(&updates(json!({"warp_drive": 9000})));
        assert_eq!(n, 0);
        assert_eq!(p, Parameters::default());
    }

    #[test]
    fn test_type_mismatch_keeps_prior_value() {
        let mut p = Parameters::default();
        let n = p.apply_updates(&updates(json!({"normal_speed": "fast"})));
        assert_eq!(n, 0);
        assert_eq!(p.normal_speed, 60);
    }

    #[test]
    fn test_out_of_range_rejected_keeps_prior() {
        // 9999 does not fit the u8 field at all: the key is dropped
        let mut p = Parameters::default();
        p.apply_updates(&updates(json!({"steering_center": 9999})));
        assert_eq!(p.steering_center, 90);
    }

    #[test]
    fn test_out_of_range_clamped() {
        // 200 fits the type but not the servo range: clamped
        let mut p = Parameters::default();
        p.apply_updates(&updates(json!({"steering_center": 200})));
        assert_eq!(p.steering_center, 180);
    }

    #[test]
    fn test_store_publishes_snapshots() {
        let store = ParamStore::default();
        let before = store.snapshot();

        store.update(&updates(json!({"slow_speed": 25})));

        assert_eq!(before.slow_speed, 35);
        assert_eq!(store.snapshot().slow_speed, 25);
    }

    #[test]
    fn test_roundtrip_file() {
        let dir = std::env::temp_dir().join("trackpilot_params_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("params.json");

        let mut p = Parameters::default();
        p.normal_speed = 48;
        p.save(&path).unwrap();

        let loaded = Parameters::load(&path);
        assert_eq!(loaded.normal_speed, 48);

        std::fs::remove_file(&path).ok();
    }
}
