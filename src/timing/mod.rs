//! Timing sources and detection validation.
//!
//! A timing source is one physical timing system (a RotorHazard node bank, a
//! LapRF unit, ...). It delivers already-decoded [`RawDetection`]s; this crate
//! never sees hardware wire bytes. Sources implement [`TimingSource`] and are
//! driven by [`crate::RaceDirector::attach`], one task per source.
//!
//! Two sources ship with the crate:
//! - [`ChannelSource`] with its push handle [`TimingEventSender`], for hardware
//!   listeners that call back from their own threads
//! - [`ReplaySource`], replaying a recorded detection list

mod channel;
mod replay;
mod validator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use channel::{ChannelSource, TimingEventSender, channel_source};
pub use replay::ReplaySource;
pub use validator::{DetectionValidator, ValidatorConfig};

use crate::Result;
use crate::types::{ChannelId, TimingSystemIndex, TimingSystemType};

/// A decoded crossing as reported by timing hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub timing_system_type: TimingSystemType,
    pub timing_system_index: TimingSystemIndex,
    /// Channel the node was tuned to
    pub channel: ChannelId,
    pub peak: i32,
    pub time: DateTime<Utc>,
    /// Whether this timing point closes a lap
    pub is_lap_end: bool,
}

/// Trait for timing data sources
///
/// Each source handles its own pacing. Events from one source arrive in
/// hardware order; there is no ordering guarantee across sources.
#[async_trait::async_trait]
pub trait TimingSource: Send + 'static {
    /// Get the next detection
    ///
    /// Returns:
    /// - `Ok(Some(event))` - New detection available
    /// - `Ok(None)` - Source finished (normal termination)
    /// - `Err(e)` - Transient or fatal source error
    async fn next_event(&mut self) -> Result<Option<RawDetection>>;

    /// Human readable name for logs
    fn name(&self) -> &str;
}
