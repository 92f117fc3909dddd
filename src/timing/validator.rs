//! Raw event to detection conversion

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::RawDetection;
use crate::detection::{Detection, ValidityType};
use crate::types::PilotId;
use crate::{RaceError, Result};

/// Signal rules applied to every raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Events with a lower signal peak are dropped
    #[serde(default)]
    pub min_peak: Option<i32>,
}

/// Turns raw hardware events into detections bound to a pilot.
///
/// The validator never touches race state; lap numbers are assigned later by
/// the assembler.
#[derive(Debug, Clone, Default)]
pub struct DetectionValidator {
    config: ValidatorConfig,
}

impl DetectionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Bind `raw` to the pilot on its channel.
    ///
    /// # Errors
    ///
    /// - [`RaceError::UnassignedChannel`] when no pilot flies the channel
    /// - [`RaceError::WeakSignal`] when the peak is under the configured threshold
    pub fn validate(&self, raw: &RawDetection, pilot_for_channel: Option<PilotId>) -> Result<Detection> {
        let Some(pilot) = pilot_for_channel else {
            return Err(RaceError::UnassignedChannel { channel: raw.channel });
        };

        if let Some(threshold) = self.config.min_peak
            && raw.peak < threshold
        {
            return Err(RaceError::WeakSignal { peak: raw.peak, threshold });
        }

        let detection = Detection::new(
            raw.timing_system_type,
            raw.timing_system_index,
            pilot,
            raw.channel,
            raw.time,
            0,
            raw.is_lap_end,
            raw.peak,
        );
        trace!(pilot = %pilot, index = raw.timing_system_index, peak = raw.peak, "Detection validated");
        Ok(detection)
    }

    /// Operator disqualification. Never reverted automatically.
    pub fn disqualify(detection: &mut Detection) {
        detection.valid = false;
        detection.validity_type = ValidityType::ManualOverride;
    }

    /// Operator reinstatement. The detection stays a manual override.
    pub fn reinstate(detection: &mut Detection) {
        detection.valid = true;
        detection.validity_type = ValidityType::ManualOverride;
    }
}
