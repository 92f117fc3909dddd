//! Display unit conversion for speeds

use serde::{Deserialize, Serialize};

const KMH_PER_MPS: f32 = 3.6;
const MPH_PER_MPS: f32 = 2.237;

/// Display unit system. Speeds are always held in metres per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn label(self) -> &'static str {
        match self {
            Units::Metric => "km/h",
            Units::Imperial => "mph",
        }
    }
}

/// Convert a speed in m/s to whole km/h or mph, truncating toward zero.
pub fn speed_to_unit(speed: f32, unit: Units) -> i32 {
    let converted = match unit {
        Units::Metric => speed * KMH_PER_MPS,
        Units::Imperial => speed * MPH_PER_MPS,
    };
    converted as i32
}

/// Converted speed followed by the unit label, e.g. `"90 km/h"`.
pub fn speed_to_string(speed: f32, unit: Units) -> String {
    format!("{} {}", speed_to_unit(speed, unit), unit.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn converts_and_truncates() {
        assert_eq!(speed_to_unit(25.0, Units::Metric), 90);
        assert_eq!(speed_to_unit(10.0, Units::Imperial), 22);
        assert_eq!(speed_to_unit(12.5, Units::Metric), 45);
        assert_eq!(speed_to_unit(0.2, Units::Metric), 0);
        assert_eq!(speed_to_string(25.0, Units::Metric), "90 km/h");
        assert_eq!(speed_to_string(10.0, Units::Imperial), "22 mph");
    }

    proptest! {
        #[test]
        fn imperial_never_exceeds_metric(speed in 0.0f32..200.0) {
            prop_assert!(speed_to_unit(speed, Units::Imperial) <= speed_to_unit(speed, Units::Metric));
            prop_assert!(speed_to_unit(speed, Units::Metric) >= 0);
        }
    }
}
