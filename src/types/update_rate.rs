//! Update rate control for race snapshot streams

use serde::{Deserialize, Serialize};

/// Update rate for race snapshot streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Every change to the race is emitted
    Native,

    /// Throttled to at most this many snapshots per second
    /// A rate of zero is treated as Native
    Max(u32),
}

impl UpdateRate {
    /// Normalize the rate, folding degenerate values into Native
    pub fn normalize(self) -> Self {
        match self {
            UpdateRate::Max(0) => UpdateRate::Native,
            other => other,
        }
    }

    /// Check if throttling is needed
    pub fn needs_throttle(self) -> bool {
        matches!(self.normalize(), UpdateRate::Max(_))
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self) -> Option<std::time::Duration> {
        match self.normalize() {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(std::time::Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}
