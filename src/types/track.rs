//! Flight path sectors and timing hardware kinds

use serde::{Deserialize, Serialize};

/// Index of a physical detection point (antenna or node), in sector order.
pub type TimingSystemIndex = u32;

/// Physical segment of the flight path ending at a timing point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sector {
    /// Length in metres, 0 when unknown
    #[serde(default)]
    pub length: f32,
}

impl Sector {
    pub fn new(length: f32) -> Self {
        Self { length }
    }

    pub fn has_length(&self) -> bool {
        self.length > 0.0
    }
}

/// Kind of timing hardware a detection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum TimingSystemType {
    #[default]
    RotorHazard,
    LapRf,
    Delta5,
    Video,
    Manual,
    Dummy,
}
