//! Track map - accumulated knowledge from lap 1.
//!
//! The track layout is randomized per run, so the robot learns it during
//! the first lap and queries that knowledge on laps 2-3. The encoder tick
//! count is the map's arc-length coordinate.
//!
//! The map has two phases: `Building` accepts updates every tick;
//! recording the fourth corner fixes `lap_length` and converts the map to
//! `Finalized`, after which no query or update mutates it.

use crate::blob::BlobColor;
use crate::world_state::{Side, Turn, WorldState};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Driving direction around the circuit, inferred from the first corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackDirection {
    Clockwise,
    CounterClockwise,
}

/// Recorded corner location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub encoder_pos: i64,
    pub direction: Turn,
}

/// Track section with measured corridor width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub start_encoder: i64,
    pub end_encoder: i64,

    /// Average corridor width over the section, mm
    pub width: f32,
}

/// Recorded pillar location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PillarRecord {
    pub encoder_pos: i64,
    pub color: BlobColor,

    /// Side of the track center the pillar sits on
    pub side: Side,

    /// Camera angle at first sighting, degrees
    pub angle: f32,
}

/// Internal mapping phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum MapPhase {
    Building {
        lap_start: Option<i64>,
        last_corner_encoder: Option<i64>,
        section_start: Option<i64>,
        width_samples: Vec<f32>,
    },
    Finalized {
        lap_length: i64,
    },
}

/// Accumulated track knowledge.
///
/// Single-writer: only the tick loop calls `update`. Queries are safe in
/// both phases and never mutate the map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMap {
    direction: Option<TrackDirection>,
    corners: Vec<Corner>,
    sections: Vec<Section>,
    pillars: Vec<PillarRecord>,
    parking_zone: Option<(i64, i64)>,

    /// Candidate corners closer than this to the last one are duplicates
    corner_tolerance: i64,

    /// Candidate pillars closer than this to a same-color record are duplicates
    pillar_tolerance: i64,

    phase: MapPhase,
}

impl TrackMap {
    pub fn new() -> Self {
        Self::with_tolerances(100, 50)
    }

    pub fn with_tolerances(corner_tolerance: i64, pillar_tolerance: i64) -> Self {
        Self {
            direction: None,
            corners: Vec::new(),
            sections: Vec::new(),
            pillars: Vec::new(),
            parking_zone: None,
            corner_tolerance,
            pillar_tolerance,
            phase: MapPhase::Building {
                lap_start: None,
                last_corner_encoder: None,
                section_start: None,
                width_samples: Vec::new(),
            },
        }
    }

    pub fn direction(&self) -> Option<TrackDirection> {
        self.direction
    }

    pub fn corners(&self) -> &[Corner] {
        &self.corners
    }

    pub fn corner_count(&self) -> usize {
        self.corners.len()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn pillars(&self) -> &[PillarRecord] {
        &self.pillars
    }

    pub fn parking_zone(&self) -> Option<(i64, i64)> {
        self.parking_zone
    }

    pub fn first_lap_complete(&self) -> bool {
        matches!(self.phase, MapPhase::Finalized { .. })
    }

    pub fn lap_length(&self) -> Option<i64> {
        match self.phase {
            MapPhase::Finalized { lap_length } => Some(lap_length),
            MapPhase::Building { .. } => None,
        }
    }

    // =========================================================================
    // First-lap accumulation
    // =========================================================================

    /// Updates the map with the current perception. Call every tick; a
    /// finalized map ignores the call.
    pub fn update(&mut self, world: &WorldState) {
        let MapPhase::Building {
            lap_start,
            last_corner_encoder,
            section_start,
            width_samples,
        } = &mut self.phase
        else {
            return;
        };

        let encoder = world.encoder_pos;

        if lap_start.is_none() {
            *lap_start = Some(encoder);
            *section_start = Some(encoder);
            info!(encoder, "track map started");
        }

        // Direction from the first corner
        if self.direction.is_none() {
            if let Some(turn) = world.corner_ahead {
                let dir = match turn {
                    Turn::Right => TrackDirection::Clockwise,
                    Turn::Left => TrackDirection::CounterClockwise,
                };
                self.direction = Some(dir);
                info!(?dir, "track direction");
            }
        }

        // Corners, with duplicate suppression
        if let Some(turn) = world.corner_ahead {
            let duplicate = last_corner_encoder
                .map(|last| (encoder - last).abs() < self.corner_tolerance)
                .unwrap_or(false);
            if !duplicate {
                self.corners.push(Corner {
                    encoder_pos: encoder,
                    direction: turn,
                });
                *last_corner_encoder = Some(encoder);
                info!(%turn, encoder, "corner recorded");

                // Close the pending section at this corner
                if let Some(start) = *section_start {
                    if !width_samples.is_empty() {
                        let width =
                            width_samples.iter().sum::<f32>() / width_samples.len() as f32;
                        self.sections.push(Section {
                            start_encoder: start,
                            end_encoder: encoder,
                            width,
                        });
                        info!(width, "section closed");
                    }
                }
                *section_start = Some(encoder);
                width_samples.clear();
            }
        }

        // Corridor width samples for the current section
        if let Some(width) = world.corridor_width() {
            width_samples.push(width);
        }

        // Pillars, deduplicated by color within the encoder tolerance
        for pillar in &world.pillars {
            let known = self.pillars.iter().any(|p| {
                p.color == pillar.color
                    && (p.encoder_pos - encoder).abs() < self.pillar_tolerance
            });
            if !known {
                let side = if pillar.angle > 0.0 {
                    Side::Right
                } else {
                    Side::Left
                };
                self.pillars.push(PillarRecord {
                    encoder_pos: encoder,
                    color: pillar.color,
                    side,
                    angle: pillar.angle,
                });
                info!(color = %pillar.color, encoder, "pillar recorded");
            }
        }

        // Parking zone, latched on first sighting
        if world.parking_marker.is_some() && self.parking_zone.is_none() {
            self.parking_zone = Some((encoder - 100, encoder + 300));
            info!(encoder, "parking zone recorded");
        }

        // Lap completion: four corners close the loop
        if self.corners.len() >= 4 {
            let lap_length = encoder - lap_start.unwrap_or(encoder);
            self.phase = MapPhase::Finalized { lap_length };
            info!(
                lap_length,
                corners = self.corners.len(),
                sections = self.sections.len(),
                pillars = self.pillars.len(),
                "first lap complete"
            );
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Distance and direction to the next corner ahead of `encoder`.
    ///
    /// On the first lap, a linear scan ahead; once finalized, the position
    /// is normalized modulo the lap length and the scan wraps. The first
    /// corner strictly ahead wins; with none ahead, wraps to the first
    /// corner overall.
    pub fn next_corner(&self, encoder: i64) -> Option<(i64, Turn)> {
        if self.corners.is_empty() {
            return None;
        }

        let Some(lap_length) = self.lap_length() else {
            return self
                .corners
                .iter()
                .find(|c| c.encoder_pos > encoder)
                .map(|c| (c.encoder_pos - encoder, c.direction));
        };

        let normalized = encoder.rem_euclid(lap_length);
        for corner in &self.corners {
            let corner_norm = corner.encoder_pos.rem_euclid(lap_length);
            if corner_norm > normalized {
                return Some((corner_norm - normalized, corner.direction));
            }
        }

        // Wrap to the first corner of the next lap
        let first = &self.corners[0];
        let dist = (lap_length - normalized) + first.encoder_pos.rem_euclid(lap_length);
        Some((dist, first.direction))
    }

    /// Pillars expected within the next `lookahead` encoder ticks.
    pub fn expected_pillars(&self, encoder: i64, lookahead: i64) -> Vec<&PillarRecord> {
        match self.lap_length() {
            None => self
                .pillars
                .iter()
                .filter(|p| {
                    let dist = p.encoder_pos - encoder;
                    (0..=lookahead).contains(&dist)
                })
                .collect(),
            Some(lap_length) => {
                let normalized = encoder.rem_euclid(lap_length);
                self.pillars
                    .iter()
                    .filter(|p| {
                        let p_norm = p.encoder_pos.rem_euclid(lap_length);
                        let dist = if p_norm >= normalized {
                            p_norm - normalized
                        } else {
                            (lap_length - normalized) + p_norm
                        };
                        dist <= lookahead
                    })
                    .collect()
            }
        }
    }

    /// Recorded average corridor width for the section containing
    /// `encoder`, if any.
    pub fn section_width(&self, encoder: i64) -> Option<f32> {
        match self.lap_length() {
            None => self
                .sections
                .iter()
                .find(|s| (s.start_encoder..=s.end_encoder).contains(&encoder))
                .map(|s| s.width),
            Some(lap_length) => {
                let normalized = encoder.rem_euclid(lap_length);
                self.sections
                    .iter()
                    .find(|s| {
                        let start = s.start_encoder.rem_euclid(lap_length);
                        let end = s.end_encoder.rem_euclid(lap_length);
                        (start..=end).contains(&normalized)
                    })
                    .map(|s| s.width)
            }
        }
    }

    /// Ticks to the start of the parking zone, if recorded and ahead.
    pub fn distance_to_parking(&self, encoder: i64) -> Option<i64> {
        let (start, _) = self.parking_zone?;

        match self.lap_length() {
            None => {
                let dist = start - encoder;
                (dist > 0).then_some(dist)
            }
            Some(lap_length) => {
                let normalized = encoder.rem_euclid(lap_length);
                let start_norm = start.rem_euclid(lap_length);
                Some(if start_norm >= normalized {
                    start_norm - normalized
                } else {
                    (lap_length - normalized) + start_norm
                })
            }
        }
    }

    /// Whether parking preparation should begin: final lap, zone known,
    /// and within `threshold` ticks of it.
    pub fn should_prepare_parking(&self, encoder: i64, lap_count: u32, threshold: i64) -> bool {
        if lap_count < 3 {
            return false;
        }
        self.distance_to_parking(encoder)
            .map(|d| d <= threshold)
            .unwrap_or(false)
    }
}

impl Default for TrackMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_state::{Pillar, WallInfo, WorldState};
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn world_at(encoder: i64) -> WorldState {
        WorldState {
            timestamp: Duration::ZERO,
            encoder_pos: encoder,
            ..WorldState::default()
        }
    }

    fn corner_world(encoder: i64, turn: Turn) -> WorldState {
        WorldState {
            corner_ahead: Some(turn),
            ..world_at(encoder)
        }
    }

    fn drive_first_lap(map: &mut TrackMap) {
        map.update(&world_at(0));
        for enc in [1000i64, 2000, 3000, 4000] {
            map.update(&corner_world(enc, Turn::Right));
        }
    }

    #[test]
    fn test_direction_from_first_corner() {
        let mut map = TrackMap::new();
        map.update(&corner_world(500, Turn::Left));
        assert_eq!(map.direction(), Some(TrackDirection::CounterClockwise));
    }

    #[test]
    fn test_corner_duplicate_suppression() {
        let mut map = TrackMap::new();
        map.update(&corner_world(1000, Turn::Right));
        map.update(&corner_world(1040, Turn::Right)); // within tolerance
        map.update(&corner_world(1200, Turn::Right)); // new corner

        assert_eq!(map.corner_count(), 2);
        let spacing = map.corners()[1].encoder_pos - map.corners()[0].encoder_pos;
        assert!(spacing >= 100);
    }

    #[test]
    fn test_lap_completion_on_fourth_corner() {
        let mut map = TrackMap::new();
        drive_first_lap(&mut map);

        assert!(map.first_lap_complete());
        assert_eq!(map.lap_length(), Some(4000));
        assert_eq!(map.corner_count(), 4);
    }

    #[test]
    fn test_frozen_after_first_lap() {
        let mut map = TrackMap::new();
        drive_first_lap(&mut map);

        map.update(&corner_world(5000, Turn::Right));
        let mut pillar_world = world_at(5200);
        pillar_world.pillars.push(Pillar {
            color: BlobColor::Red,
            angle: 10.0,
            distance: 500.0,
        });
        map.update(&pillar_world);

        assert_eq!(map.corner_count(), 4);
        assert!(map.pillars().is_empty());
        assert_eq!(map.lap_length(), Some(4000));
    }

    #[test]
    fn test_update_idempotent() {
        let mut map_once = TrackMap::new();
        let mut map_twice = TrackMap::new();
        let world = corner_world(1000, Turn::Right);

        map_once.update(&world);
        map_twice.update(&world);
        map_twice.update(&world);

        assert_eq!(map_once.corner_count(), map_twice.corner_count());
        assert_eq!(map_once.pillars().len(), map_twice.pillars().len());
    }

    #[test]
    fn test_section_widths() {
        let mut map = TrackMap::new();
        let mut w = world_at(0);
        w.walls = WallInfo {
            left: Some(400.0),
            right: Some(400.0),
            front: None,
        };
        map.update(&w);
        let mut w2 = world_at(500);
        w2.walls = WallInfo {
            left: Some(500.0),
            right: Some(300.0),
            front: None,
        };
        map.update(&w2);
        map.update(&corner_world(1000, Turn::Right));

        assert_eq!(map.sections().len(), 1);
        assert_relative_eq!(map.sections()[0].width, 800.0);
        assert_relative_eq!(map.section_width(500).unwrap(), 800.0);
    }

    #[test]
    fn test_pillar_dedup_same_color_only() {
        let mut map = TrackMap::new();
        let mut w = world_at(100);
        w.pillars.push(Pillar {
            color: BlobColor::Red,
            angle: 10.0,
            distance: 500.0,
        });
        map.update(&w);

        // Same color nearby: duplicate
        let mut w2 = world_at(120);
        w2.pillars.push(Pillar {
            color: BlobColor::Red,
            angle: 8.0,
            distance: 450.0,
        });
        map.update(&w2);

        // Different color nearby: new record
        let mut w3 = world_at(130);
        w3.pillars.push(Pillar {
            color: BlobColor::Green,
            angle: -12.0,
            distance: 480.0,
        });
        map.update(&w3);

        assert_eq!(map.pillars().len(), 2);
        assert_eq!(map.pillars()[0].side, Side::Right);
        assert_eq!(map.pillars()[1].side, Side::Left);
    }

    #[test]
    fn test_next_corner_first_lap() {
        let mut map = TrackMap::new();
        map.update(&corner_world(1000, Turn::Right));
        map.update(&corner_world(2000, Turn::Right));

        let (dist, turn) = map.next_corner(1500).unwrap();
        assert_eq!(dist, 500);
        assert_eq!(turn, Turn::Right);

        // Nothing ahead yet and no lap length: no answer
        assert!(map.next_corner(2500).is_none());
    }

    #[test]
    fn test_next_corner_wraps_after_finalize() {
        let mut map = TrackMap::new();
        drive_first_lap(&mut map);

        // Lap length 4000; corner at 1000 normalizes to 1000
        let (dist, _) = map.next_corner(4500).unwrap();
        assert_eq!(dist, 500);

        // Past the last corner (4000 -> normalized 0 is a corner at 0...
        // 3900 normalized: next is corner at 4000 % 4000 = 0 -> wraps
        let (dist, _) = map.next_corner(3900).unwrap();
        assert_eq!(dist, 1100); // wrap: 100 to lap end + 1000 to first corner
    }

    #[test]
    fn test_expected_pillars_lookahead() {
        let mut map = TrackMap::new();
        let mut w = world_at(100);
        w.pillars.push(Pillar {
            color: BlobColor::Red,
            angle: 10.0,
            distance: 500.0,
        });
        map.update(&w);
        let mut w2 = world_at(900);
        w2.pillars.push(Pillar {
            color: BlobColor::Green,
            angle: -10.0,
            distance: 500.0,
        });
        map.update(&w2);

        let ahead = map.expected_pillars(0, 500);
        assert_eq!(ahead.len(), 1);
        assert_eq!(ahead[0].color, BlobColor::Red);
    }

    #[test]
    fn test_parking_zone_latch_and_distance() {
        let mut map = TrackMap::new();
        let mut w = world_at(2000);
        w.parking_marker = Some(900.0);
        map.update(&w);

        assert_eq!(map.parking_zone(), Some((1900, 2300)));
        assert_eq!(map.distance_to_parking(1500), Some(400));
        assert_eq!(map.distance_to_parking(2500), None); // behind, first lap

        // Second sighting does not move the zone
        let mut w2 = world_at(2600);
        w2.parking_marker = Some(700.0);
        map.update(&w2);
        assert_eq!(map.parking_zone(), Some((1900, 2300)));
    }

    #[test]
    fn test_should_prepare_parking_gates_on_lap() {
        let mut map = TrackMap::new();
        let mut w = world_at(2000);
        w.parking_marker = Some(900.0);
        map.update(&w);

        assert!(!map.should_prepare_parking(1600, 2, 500));
        assert!(map.should_prepare_parking(1600, 3, 500));
        assert!(!map.should_prepare_parking(1000, 3, 500));
    }

    #[test]
    fn test_negative_encoder_normalizes() {
        let mut map = TrackMap::new();
        drive_first_lap(&mut map);

        // A reversed encoder must not panic or return negative distances
        let (dist, _) = map.next_corner(-100).unwrap();
        assert!(dist > 0);
    }
}
