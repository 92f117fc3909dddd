//! Radio channels, bands and band types

use serde::{Deserialize, Serialize};

use super::ChannelId;

/// A class of radio technology. Channels are only interchangeable within a band type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum BandType {
    Analogue,
    Digital,
}

/// Video transmitter band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum Band {
    A,
    B,
    E,
    Fatshark,
    RaceBand,
    LowBand,
    DjiFpvHd,
    DjiO3,
    HdZero,
}

impl Band {
    /// The band type this band belongs to.
    pub fn band_type(self) -> BandType {
        match self {
            Band::A | Band::B | Band::E | Band::Fatshark | Band::RaceBand | Band::LowBand => {
                BandType::Analogue
            }
            Band::DjiFpvHd | Band::DjiO3 | Band::HdZero => BandType::Digital,
        }
    }

    /// Short label used in channel names (R1, F4, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Band::A => "A",
            Band::B => "B",
            Band::E => "E",
            Band::Fatshark => "F",
            Band::RaceBand => "R",
            Band::LowBand => "L",
            Band::DjiFpvHd => "DJI",
            Band::DjiO3 => "O3-",
            Band::HdZero => "HDZ",
        }
    }

    /// Channel frequencies of the band in MHz, channel 1 first.
    pub fn frequencies(self) -> &'static [u16; 8] {
        match self {
            Band::A => &[5865, 5845, 5825, 5805, 5785, 5765, 5745, 5725],
            Band::B => &[5733, 5752, 5771, 5790, 5809, 5828, 5847, 5866],
            Band::E => &[5705, 5685, 5665, 5645, 5885, 5905, 5925, 5945],
            Band::Fatshark => &[5740, 5760, 5780, 5800, 5820, 5840, 5860, 5880],
            Band::RaceBand | Band::HdZero => &[5658, 5695, 5732, 5769, 5806, 5843, 5880, 5917],
            Band::LowBand => &[5362, 5399, 5436, 5473, 5510, 5547, 5584, 5621],
            Band::DjiFpvHd => &[5660, 5695, 5735, 5770, 5805, 5878, 5914, 5839],
            Band::DjiO3 => &[5669, 5705, 5768, 5804, 5839, 5876, 5912, 5730],
        }
    }
}

/// A radio frequency slot shared across an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub band: Band,
    /// 1-based channel number within the band
    pub number: u8,
    /// Centre frequency in MHz
    pub frequency: u16,
}

impl Channel {
    pub fn new(band: Band, number: u8, frequency: u16) -> Self {
        Self { id: ChannelId::new(), band, number, frequency }
    }

    pub fn band_type(&self) -> BandType {
        self.band.band_type()
    }

    /// Whether two channels would interfere on air.
    pub fn interferes_with(&self, other: &Channel) -> bool {
        self.id == other.id || self.frequency == other.frequency
    }

    /// All eight channels of a band with fresh ids.
    pub fn band_channels(band: Band) -> Vec<Channel> {
        band.frequencies()
            .iter()
            .zip(1u8..)
            .map(|(&frequency, number)| Channel::new(band, number, frequency))
            .collect()
    }

    pub fn raceband() -> Vec<Channel> {
        Self::band_channels(Band::RaceBand)
    }

    pub fn fatshark() -> Vec<Channel> {
        Self::band_channels(Band::Fatshark)
    }

    pub fn dji_fpv() -> Vec<Channel> {
        Self::band_channels(Band::DjiFpvHd)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} {}MHz", self.band.prefix(), self.number, self.frequency)
    }
}
