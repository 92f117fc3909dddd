//! Laps and splits

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::types::{DetectionId, LapId, PilotId, RaceId, TimingSystemIndex};

/// Non-negative wall-clock difference, zero when `end` precedes `start`.
pub(crate) fn elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or_default()
}

/// A completed lap, terminated by a lap-end detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub id: LapId,
    /// Owning race. Set when the race adopts the lap, never at construction.
    #[serde(default)]
    pub race: Option<RaceId>,
    pub detection: DetectionId,
    pub pilot: PilotId,
    pub number: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub length: Duration,
}

impl Lap {
    pub fn new(detection: &Detection, start: DateTime<Utc>) -> Self {
        Self {
            id: LapId::new(),
            race: None,
            detection: detection.id,
            pilot: detection.pilot,
            number: detection.lap_number,
            start,
            end: detection.time,
            length: elapsed(start, detection.time),
        }
    }

    pub fn is_holeshot(&self) -> bool {
        self.number == 0
    }
}

/// Timed interval between two consecutive valid detections of one pilot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub pilot: PilotId,
    /// Detection closing the interval
    pub detection: DetectionId,
    pub timing_system_index: TimingSystemIndex,
    pub lap_number: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub time: Duration,
}

impl Split {
    /// Interval from `start` (previous boundary or race start) to `detection`.
    pub fn ending_at(detection: &Detection, start: DateTime<Utc>) -> Self {
        Self {
            pilot: detection.pilot,
            detection: detection.id,
            timing_system_index: detection.timing_system_index,
            lap_number: detection.lap_number,
            start,
            end: detection.time,
            time: elapsed(start, detection.time),
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Split {} L{} I{} {:.3}s",
            self.pilot,
            self.lap_number,
            self.timing_system_index,
            self.time.as_secs_f64()
        )
    }
}
