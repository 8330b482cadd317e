//! Simulation scenarios.

use clap::ValueEnum;

/// Scenario identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioId {
    /// Straight corridor driving, no obstacles
    OpenCorridor,

    /// Pillars in the corridor requiring avoidance maneuvers
    PillarGauntlet,

    /// A pillar with a narrowed camera FOV, forcing the blind-hold path
    BlindPass,

    /// One full circuit to exercise track mapping
    FirstLapMapping,

    /// Three laps plus a parking marker
    FullRace,
}

impl ScenarioId {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::OpenCorridor => "open-corridor",
            ScenarioId::PillarGauntlet => "pillar-gauntlet",
            ScenarioId::BlindPass => "blind-pass",
            ScenarioId::FirstLapMapping => "first-lap-mapping",
            ScenarioId::FullRace => "full-race",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::OpenCorridor => "hold the corridor center with no obstacles",
            ScenarioId::PillarGauntlet => "confirm and avoid colored pillars",
            ScenarioId::BlindPass => "keep avoiding while the pillar leaves the FOV",
            ScenarioId::FirstLapMapping => "learn corners and widths on lap one",
            ScenarioId::FullRace => "three laps with mapping and a parking marker",
        }
    }

    pub fn all() -> &'static [ScenarioId] {
        &[
            ScenarioId::OpenCorridor,
            ScenarioId::PillarGauntlet,
            ScenarioId::BlindPass,
            ScenarioId::FirstLapMapping,
            ScenarioId::FullRace,
        ]
    }
}
