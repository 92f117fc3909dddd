//! Rounds and timing locations

use serde::{Deserialize, Serialize};

use crate::types::RoundId;

/// Governs how a round's races come into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum RoundType {
    /// Races added by hand or from a round plan
    #[default]
    Round,
    Final,
    DoubleElimination,
    CustomFormat,
}

impl RoundType {
    /// Whether races are produced by a format rather than added by the operator.
    pub fn auto_generated(self) -> bool {
        !matches!(self, RoundType::Round)
    }
}

/// Where the primary timing gate sits relative to the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum PrimaryTimingSystemLocation {
    /// First crossing after the start is the holeshot, lap 0
    #[default]
    Holeshot,
    /// Pilots start on the line; the first crossing completes lap 1
    EndOfLap,
}

impl PrimaryTimingSystemLocation {
    /// Lap number given to the first lap-end crossing.
    pub fn first_lap_number(self) -> u32 {
        match self {
            PrimaryTimingSystemLocation::Holeshot => 0,
            PrimaryTimingSystemLocation::EndOfLap => 1,
        }
    }
}

/// An ordered stage of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub number: u32,
    pub round_type: RoundType,
}

impl Round {
    pub fn new(number: u32, round_type: RoundType) -> Self {
        Self { id: RoundId::new(), number, round_type }
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.round_type {
            RoundType::Round => write!(f, "Round {}", self.number),
            RoundType::Final => write!(f, "Final {}", self.number),
            RoundType::DoubleElimination => write!(f, "Double Elimination {}", self.number),
            RoundType::CustomFormat => write!(f, "Custom {}", self.number),
        }
    }
}
