//! Round generation.
//!
//! A [`RoundFormat`] turns a [`RoundPlan`] into the races of the next round.
//! Formats are pure: they read a quiescent snapshot of the event and return
//! race shells with pilot-channel assignments for the caller to commit.
//!
//! ```rust
//! use holeshot::format::{FormatContext, RoundFormat, RoundPlan, TopFormat};
//! use holeshot::types::{Channel, PilotId};
//! use holeshot::{Round, RoundType};
//!
//! let plan = RoundPlan {
//!     pilots: (0..9).map(|_| PilotId::new()).collect(),
//!     channels: Channel::raceband(),
//!     number_of_races: 3,
//!     calling_round: None,
//!     target_laps: 3,
//! };
//! let round = Round::new(2, RoundType::Final);
//! let generated = TopFormat.generate_round(&FormatContext::default(), &[], &round, &plan);
//!
//! let counts: Vec<usize> = generated.races.iter().map(|r| r.pilot_count()).collect();
//! assert_eq!(counts, vec![3, 3, 3]);
//! ```

mod top;

use serde::{Deserialize, Serialize};

pub use top::TopFormat;

use crate::race::{PrimaryTimingSystemLocation, Race, Round};
use crate::types::{Channel, PilotId, RoundId};

/// Input for generating one round.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoundPlan {
    /// Pilots in seeding order
    pub pilots: Vec<PilotId>,
    /// Channels the new races may use, in preference order
    pub channels: Vec<Channel>,
    pub number_of_races: usize,
    /// Round whose results feed this one
    #[serde(default)]
    pub calling_round: Option<RoundId>,
    #[serde(default)]
    pub target_laps: u32,
}

/// Read-only view of the event a format may consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatContext<'a> {
    /// Races of the event, at least those of the calling round
    pub races: &'a [Race],
    pub primary_timing_system_location: PrimaryTimingSystemLocation,
}

impl<'a> FormatContext<'a> {
    pub fn new(races: &'a [Race], primary_timing_system_location: PrimaryTimingSystemLocation) -> Self {
        Self { races, primary_timing_system_location }
    }

    /// Channel the pilot flew in the given round, if any.
    pub fn channel_in_round(&self, pilot: PilotId, round: Option<RoundId>) -> Option<&'a Channel> {
        let round = round?;
        self.races
            .iter()
            .filter(|race| race.round == round)
            .find_map(|race| race.channel_of(pilot))
    }
}

/// Races produced for a round, plus pilots no channel could be found for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneratedRound {
    pub races: Vec<Race>,
    /// Pilots left out, in plan order; the caller decides how to escalate
    pub unassigned: Vec<PilotId>,
}

impl GeneratedRound {
    pub fn is_empty(&self) -> bool {
        self.races.is_empty()
    }

    pub fn assigned_pilots(&self) -> usize {
        self.races.iter().map(Race::pilot_count).sum()
    }
}

/// A tournament format.
pub trait RoundFormat: Send + Sync {
    /// Name shown to operators
    fn name(&self) -> &str;

    /// Generate the races of `new_round`. Race numbers continue after
    /// `pre_existing`, the races the round already holds.
    fn generate_round(
        &self,
        context: &FormatContext<'_>,
        pre_existing: &[Race],
        new_round: &Round,
        plan: &RoundPlan,
    ) -> GeneratedRound;
}
