//! Detection records and race sector keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, DetectionId, PilotId, TimingSystemIndex, TimingSystemType};

/// Composite key for a (lap, checkpoint) pair within a race.
pub fn race_sector(lap_number: u32, timing_system_index: TimingSystemIndex) -> u32 {
    lap_number * 100 + timing_system_index
}

/// How a detection's validity was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum ValidityType {
    /// Decided by the pipeline
    #[default]
    Auto,
    /// Set by an operator; never reverts to Auto
    ManualOverride,
}

/// A single hardware-reported crossing for a pilot at a timing point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: DetectionId,
    pub pilot: PilotId,
    pub channel: ChannelId,
    pub timing_system_type: TimingSystemType,
    pub timing_system_index: TimingSystemIndex,
    pub time: DateTime<Utc>,
    pub peak: i32,
    pub lap_number: u32,
    pub is_lap_end: bool,
    pub valid: bool,
    pub validity_type: ValidityType,
}

impl Detection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timing_system_type: TimingSystemType,
        timing_system_index: TimingSystemIndex,
        pilot: PilotId,
        channel: ChannelId,
        time: DateTime<Utc>,
        lap_number: u32,
        is_lap_end: bool,
        peak: i32,
    ) -> Self {
        Self {
            id: DetectionId::new(),
            pilot,
            channel,
            timing_system_type,
            timing_system_index,
            time,
            peak,
            lap_number,
            is_lap_end,
            valid: true,
            validity_type: ValidityType::Auto,
        }
    }

    pub fn race_sector(&self) -> u32 {
        race_sector(self.lap_number, self.timing_system_index)
    }

    /// 1-based sector number for display.
    pub fn sector_number(&self) -> u32 {
        self.timing_system_index + 1
    }

    pub fn is_holeshot(&self) -> bool {
        self.valid && self.is_lap_end && self.lap_number == 0
    }

    pub fn is_manual(&self) -> bool {
        self.validity_type == ValidityType::ManualOverride
    }
}

impl std::fmt::Display for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Detection {} L{} I{} RS{} T{}",
            self.pilot,
            self.lap_number,
            self.timing_system_index,
            self.race_sector(),
            self.time.format("%H:%M:%S%.3f")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn detection(lap_number: u32, is_lap_end: bool, valid: bool) -> Detection {
        let mut detection = Detection::new(
            TimingSystemType::Dummy,
            0,
            PilotId::new(),
            ChannelId::new(),
            Utc::now(),
            lap_number,
            is_lap_end,
            100,
        );
        detection.valid = valid;
        detection
    }

    #[test]
    fn race_sector_examples() {
        assert_eq!(race_sector(2, 3), 203);
        assert_eq!(race_sector(0, 0), 0);
        assert_eq!(race_sector(0, 7), 7);
    }

    #[test]
    fn holeshot_truth_table() {
        assert!(detection(0, true, true).is_holeshot());
        assert!(!detection(0, false, true).is_holeshot());
        assert!(!detection(0, true, false).is_holeshot());
        assert!(!detection(1, true, true).is_holeshot());
    }

    #[test]
    fn new_detections_are_valid_and_auto() {
        let d = detection(3, true, true);
        assert!(d.valid);
        assert_eq!(d.validity_type, ValidityType::Auto);
        assert!(!d.is_manual());
        assert_eq!(d.sector_number(), 1);
        assert_eq!(d.race_sector(), 300);
    }

    proptest! {
        #[test]
        fn race_sector_is_lap_times_hundred_plus_index(lap in 0u32..10_000, index in 0u32..100) {
            prop_assert_eq!(race_sector(lap, index), lap * 100 + index);
        }

        #[test]
        fn race_sector_is_injective_below_hundred_nodes(
            a in (0u32..1000, 0u32..100),
            b in (0u32..1000, 0u32..100),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(race_sector(a.0, a.1), race_sector(b.0, b.1));
        }
    }
}
