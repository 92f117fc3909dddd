//! Event configuration.
//!
//! An event file describes the flight path, the timing points closing each
//! sector, the channels in use and the timing rules:
//!
//! ```yaml
//! name: Club night
//! primary_timing_system_location: holeshot
//! units: metric
//! timing:
//!   min_peak: 110
//!   min_lap_time_ms: 4000
//!   ordering: resequence
//! sectors:
//!   - length: 60.0
//!   - length: 45.5
//! timing_systems: [0, 1]
//! channels:
//!   - band: race_band
//!     number: 1
//!   - band: race_band
//!     number: 4
//!     frequency: 5769
//! ```
//!
//! Every field is optional. Channels without an explicit frequency take the
//! band's frequency table; channels without an id get a fresh one on load.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assembler::{AssemblerConfig, OrderingPolicy};
use crate::race::PrimaryTimingSystemLocation;
use crate::timing::ValidatorConfig;
use crate::types::{Band, Channel, ChannelId, Sector, TimingSystemIndex, Units};
use crate::{RaceError, Result};

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Signal and lap rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub min_peak: Option<i32>,
    pub min_lap_time_ms: Option<u64>,
    pub ordering: OrderingPolicy,
}

/// A channel entry of the event file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub band: Band,
    /// 1-based channel number within the band
    pub number: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ChannelId>,
}

impl ChannelConfig {
    fn resolved_frequency(&self) -> Option<u16> {
        self.frequency.or_else(|| {
            let index = usize::from(self.number).checked_sub(1)?;
            self.band.frequencies().get(index).copied()
        })
    }
}

/// Event-wide settings for the race pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub name: String,
    pub primary_timing_system_location: PrimaryTimingSystemLocation,
    pub units: Units,
    pub timing: TimingConfig,
    /// Flight-path sectors in order
    pub sectors: Vec<Sector>,
    /// Timing point closing each sector, in sector order
    pub timing_systems: Vec<TimingSystemIndex>,
    pub channels: Vec<ChannelConfig>,
    /// Buffered pipeline notifications per subscriber
    pub event_channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            primary_timing_system_location: PrimaryTimingSystemLocation::default(),
            units: Units::default(),
            timing: TimingConfig::default(),
            sectors: Vec::new(),
            timing_systems: Vec::new(),
            channels: Vec::new(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EventConfig {
    /// Parse and validate an event description.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::parse(yaml).map_err(|e| RaceError::config("Event config", format!("{e:#}")))
    }

    /// Load an event description from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RaceError::file_error(path.to_path_buf(), e))?;
        let config = Self::from_yaml(&yaml)?;
        info!(
            "Loaded event {:?} from {} ({} sectors, {} channels)",
            config.name,
            path.display(),
            config.sectors.len(),
            config.channels.len()
        );
        Ok(config)
    }

    fn parse(yaml: &str) -> anyhow::Result<Self> {
        let mut config: Self = serde_yaml_ng::from_str(yaml).context("YAML parsing failed")?;
        config.check().context("Invalid event")?;
        for channel in &mut config.channels {
            channel.id.get_or_insert_with(ChannelId::new);
        }
        Ok(config)
    }

    fn check(&self) -> anyhow::Result<()> {
        for (index, sector) in self.sectors.iter().enumerate() {
            ensure!(
                sector.length >= 0.0 && sector.length.is_finite(),
                "sector {} has invalid length {}",
                index + 1,
                sector.length
            );
        }

        let mut seen: Vec<(u16, &ChannelConfig)> = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let Some(frequency) = channel.resolved_frequency() else {
                bail!("{:?} channel {} has no frequency", channel.band, channel.number);
            };
            if let Some((_, other)) = seen.iter().find(|(f, _)| *f == frequency) {
                bail!(
                    "{:?} {} and {:?} {} share {} MHz",
                    other.band,
                    other.number,
                    channel.band,
                    channel.number,
                    frequency
                );
            }
            seen.push((frequency, channel));
        }

        ensure!(self.event_channel_capacity > 0, "event_channel_capacity must be positive");
        Ok(())
    }

    /// Channels of the event, in file order.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .filter_map(|c| {
                Some(Channel {
                    id: c.id?,
                    band: c.band,
                    number: c.number,
                    frequency: c.resolved_frequency()?,
                })
            })
            .collect()
    }

    /// Timing point for each sector; defaults to `0..sectors`.
    pub fn timing_system_order(&self) -> Vec<TimingSystemIndex> {
        if self.timing_systems.is_empty() {
            (0..self.sectors.len() as TimingSystemIndex).collect()
        } else {
            self.timing_systems.clone()
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig { min_peak: self.timing.min_peak }
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            ordering: self.timing.ordering,
            min_lap_time: self.timing.min_lap_time_ms.map(Duration::from_millis),
        }
    }
}
