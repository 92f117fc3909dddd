//! Error types for the race pipeline.
//!
//! Nothing in this crate is fatal to the process. Every failure degrades to
//! "no state change" plus a [`RaceError`] that the caller logs or surfaces.
//!
//! ## Error Categories
//!
//! - **Input Errors**: detections for an unassigned channel or below the peak threshold
//! - **Ordering Errors**: detections older than the pilot's last processed crossing
//! - **State Errors**: operations against a race in the wrong lifecycle state
//! - **Lookup Errors**: unknown races, rounds or detections
//! - **Configuration Errors**: malformed or inconsistent event configuration
//! - **Source Errors**: a timing source failed to deliver events
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use holeshot::RaceError;
//!
//! let error = RaceError::source_failed("node 2 stopped responding");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::race::{RaceState, RoundType};
use crate::types::{ChannelId, DetectionId, PilotId, RaceId, RoundId};

/// Result type alias for race operations.
pub type Result<T, E = RaceError> = std::result::Result<T, E>;

/// Main error type for race operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RaceError {
    #[error("No pilot is assigned to channel {channel}")]
    UnassignedChannel { channel: ChannelId },

    #[error("Signal peak {peak} is below the threshold {threshold}")]
    WeakSignal { peak: i32, threshold: i32 },

    #[error("Detection for pilot {pilot} at {time} is older than the last processed crossing at {last}")]
    OutOfOrder { pilot: PilotId, time: DateTime<Utc>, last: DateTime<Utc> },

    #[error("Pilot {pilot} already has a manual detection for race sector {race_sector}")]
    RaceSectorTaken { pilot: PilotId, race_sector: u32 },

    #[error("Round {round} is {round_type:?}; its races come from a format")]
    RoundAutoGenerated { round: RoundId, round_type: RoundType },

    #[error("Race {race} is not running (state: {state:?})")]
    RaceNotRunning { race: RaceId, state: RaceState },

    #[error("Race {race} cannot go from {from:?} to {to:?}")]
    InvalidTransition { race: RaceId, from: RaceState, to: RaceState },

    #[error("Race {race} not found")]
    RaceNotFound { race: RaceId },

    #[error("No race is currently selected")]
    NoCurrentRace,

    #[error("Detection {detection} not found")]
    DetectionNotFound { detection: DetectionId },

    #[error("Channel {channel} is already held by pilot {pilot}")]
    ChannelOccupied { channel: ChannelId, pilot: PilotId },

    #[error("Round {round} not found")]
    RoundNotFound { round: RoundId },

    #[error("Round {round} still has {unfinished} unfinished race(s)")]
    RoundNotComplete { round: RoundId, unfinished: usize },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Event file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timing source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RaceError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RaceError::Source { .. } => true,
            RaceError::RaceNotRunning { .. } => true,
            RaceError::NoCurrentRace => true,
            RaceError::UnassignedChannel { .. } => false,
            RaceError::WeakSignal { .. } => false,
            RaceError::OutOfOrder { .. } => false,
            RaceError::RaceSectorTaken { .. } => false,
            RaceError::RoundAutoGenerated { .. } => false,
            RaceError::InvalidTransition { .. } => false,
            RaceError::RaceNotFound { .. } => false,
            RaceError::DetectionNotFound { .. } => false,
            RaceError::ChannelOccupied { .. } => false,
            RaceError::RoundNotFound { .. } => false,
            RaceError::RoundNotComplete { .. } => true,
            RaceError::Config { .. } => false,
            RaceError::File { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RaceError::UnassignedChannel { .. } => vec![
                "Assign a pilot to the channel before starting the race",
                "Check the timing node frequencies match the race channels",
            ],
            RaceError::WeakSignal { .. } => vec![
                "Lower the peak threshold in the timing settings",
                "Check the antenna placement of the timing node",
            ],
            RaceError::OutOfOrder { .. } => vec![
                "Check the clocks of the timing systems are synchronised",
                "Switch the ordering policy to resequence",
            ],
            RaceError::RaceSectorTaken { .. } => vec![
                "Disqualify the manual detection holding the race sector first",
                "Check the timing point index of the manual detection",
            ],
            RaceError::RoundAutoGenerated { .. } => vec![
                "Generate the round's races with a round format",
                "Add hand-built races to a plain round instead",
            ],
            RaceError::RaceNotRunning { .. } => vec![
                "Start or resume the race before feeding detections",
                "Ignore detections that arrive after the race has ended",
            ],
            RaceError::InvalidTransition { .. } => vec![
                "Check the race state before changing it",
                "Reset the race to start it again",
            ],
            RaceError::RaceNotFound { .. } => vec![
                "Check the race id",
                "Reload the event races",
            ],
            RaceError::NoCurrentRace => vec![
                "Select the race to run before starting the timing sources",
            ],
            RaceError::DetectionNotFound { .. } => vec![
                "Check the detection belongs to the selected race",
            ],
            RaceError::ChannelOccupied { .. } => vec![
                "Move the other pilot to a free channel first",
                "Pick a channel with a free frequency",
            ],
            RaceError::RoundNotFound { .. } => vec![
                "Check the round id",
            ],
            RaceError::RoundNotComplete { .. } => vec![
                "End every race in the calling round before generating the next one",
            ],
            RaceError::Config { .. } => vec![
                "Check the event file format",
                "Remove duplicate channel frequencies",
                "Use non-negative sector lengths",
            ],
            RaceError::File { .. } => vec![
                "Check the event file exists and is readable",
                "Check file permissions",
            ],
            RaceError::Source { .. } => vec![
                "Check the timing hardware is powered and connected",
                "Restart the timing source",
                "Verify the timing system firmware version",
            ],
        }
    }

    /// Helper constructor for timing source failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        RaceError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for timing source failures with an underlying cause.
    pub fn source_failed_with(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RaceError::Source { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        RaceError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        RaceError::File { path, source }
    }
}

impl From<std::io::Error> for RaceError {
    fn from(err: std::io::Error) -> Self {
        RaceError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
