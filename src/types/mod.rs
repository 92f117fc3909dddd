//! Core value types shared by the race pipeline.
//!
//! - [`PilotId`], [`ChannelId`], [`RaceId`], [`RoundId`], [`DetectionId`], [`LapId`]
//!   are opaque 128-bit identifiers, stable across the external store
//! - [`Pilot`] is a competitor, identified by id and never by reference
//! - [`Channel`] is a radio frequency slot in a [`Band`] of a given [`BandType`]
//! - [`Sector`] is a flight path segment with a physical length
//! - [`Units`] converts canonical m/s speeds for display
//! - [`UpdateRate`] controls how often snapshot streams emit
//!
//! ```rust
//! use holeshot::types::{speed_to_unit, BandType, Channel, Units};
//!
//! let raceband = Channel::raceband();
//! assert_eq!(raceband[0].band_type(), BandType::Analogue);
//! assert_eq!(speed_to_unit(25.0, Units::Metric), 90);
//! ```

mod channel;
mod ids;
mod pilot;
mod track;
mod units;
mod update_rate;

pub use channel::{Band, BandType, Channel};
pub use ids::{ChannelId, DetectionId, LapId, PilotId, RaceId, RoundId};
pub use pilot::Pilot;
pub use track::{Sector, TimingSystemIndex, TimingSystemType};
pub use units::{Units, speed_to_string, speed_to_unit};
pub use update_rate::UpdateRate;
