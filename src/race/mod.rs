//! Races, their lifecycle and their timing records.
//!
//! A [`Race`] owns its pilot-channel assignments, [`Detection`]s and [`Lap`]s.
//! Laps point back at their race by [`RaceId`] only; the back-reference is set
//! when the race adopts a lap, and [`Race::relink_laps`] restores it after an
//! external store hands a race back.
//!
//! ## Lifecycle
//!
//! ```text
//! NotStarted ──► Running ◄──► Paused
//!                   │            │
//!                   └──► Ended ◄─┘
//! ```
//!
//! Detections are only accepted while `Running`. An ended race is immutable
//! except for manual detection edits, which re-derive the affected pilot.
//! All mutation of laps and detections goes through [`crate::LapAssembler`].

mod lap;
mod round;

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use lap::{Lap, Split};
pub(crate) use lap::elapsed;
pub use round::{PrimaryTimingSystemLocation, Round, RoundType};

use crate::detection::Detection;
use crate::types::{Channel, ChannelId, DetectionId, LapId, PilotId, RaceId, RoundId};
use crate::{RaceError, Result};

/// Lifecycle state of a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum RaceState {
    #[default]
    NotStarted,
    Running,
    Paused,
    Ended,
}

/// A pilot flying a race on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotChannel {
    pub pilot: PilotId,
    pub channel: Channel,
}

/// A single heat within a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub id: RaceId,
    pub round: RoundId,
    /// Ordering within the round, 1-based
    pub race_number: u32,
    pub target_laps: u32,
    pub valid: bool,
    pub primary_timing_system_location: PrimaryTimingSystemLocation,
    pilot_channels: Vec<PilotChannel>,
    laps: Vec<Lap>,
    detections: Vec<Detection>,
    state: RaceState,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    total_paused: Duration,
}

impl Race {
    pub fn new(round: RoundId, race_number: u32) -> Self {
        Self {
            id: RaceId::new(),
            round,
            race_number,
            target_laps: 0,
            valid: true,
            primary_timing_system_location: PrimaryTimingSystemLocation::default(),
            pilot_channels: Vec::new(),
            laps: Vec::new(),
            detections: Vec::new(),
            state: RaceState::NotStarted,
            start: None,
            end: None,
            paused_at: None,
            total_paused: Duration::ZERO,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> RaceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RaceState::Running
    }

    pub fn started(&self) -> bool {
        self.state != RaceState::NotStarted
    }

    pub fn ended(&self) -> bool {
        self.state == RaceState::Ended
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn total_paused(&self) -> Duration {
        self.total_paused
    }

    fn transition(&mut self, to: RaceState) -> Result<()> {
        let allowed = matches!(
            (self.state, to),
            (RaceState::NotStarted, RaceState::Running)
                | (RaceState::Running, RaceState::Paused)
                | (RaceState::Paused, RaceState::Running)
                | (RaceState::Running, RaceState::Ended)
                | (RaceState::Paused, RaceState::Ended)
        );
        if !allowed {
            return Err(RaceError::InvalidTransition { race: self.id, from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    pub fn start_at(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.transition(RaceState::Running)?;
        self.start = Some(time);
        Ok(())
    }

    pub fn pause_at(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.transition(RaceState::Paused)?;
        self.paused_at = Some(time);
        Ok(())
    }

    pub fn resume_at(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.transition(RaceState::Running)?;
        if let Some(paused_at) = self.paused_at.take() {
            self.total_paused += elapsed(paused_at, time);
        }
        Ok(())
    }

    pub fn end_at(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.transition(RaceState::Ended)?;
        if let Some(paused_at) = self.paused_at.take() {
            self.total_paused += elapsed(paused_at, time);
        }
        self.end = Some(time);
        Ok(())
    }

    /// Back to `NotStarted`, discarding all timing records. Assignments are kept.
    pub fn reset(&mut self) {
        self.state = RaceState::NotStarted;
        self.start = None;
        self.end = None;
        self.paused_at = None;
        self.total_paused = Duration::ZERO;
        self.laps.clear();
        self.detections.clear();
    }

    /// Flying time at `now`, excluding pauses.
    pub fn race_time(&self, now: DateTime<Utc>) -> Duration {
        let Some(start) = self.start else {
            return Duration::ZERO;
        };
        let until = match (self.end, self.paused_at) {
            (Some(end), _) => end,
            (None, Some(paused_at)) => paused_at,
            (None, None) => now,
        };
        elapsed(start, until).saturating_sub(self.total_paused)
    }

    // ── Assignments ───────────────────────────────────────────────────────────

    pub fn pilot_channels(&self) -> &[PilotChannel] {
        &self.pilot_channels
    }

    pub fn pilots(&self) -> impl Iterator<Item = PilotId> + '_ {
        self.pilot_channels.iter().map(|pc| pc.pilot)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> + '_ {
        self.pilot_channels.iter().map(|pc| &pc.channel)
    }

    pub fn pilot_count(&self) -> usize {
        self.pilot_channels.len()
    }

    pub fn has_pilot(&self, pilot: PilotId) -> bool {
        self.pilot_channels.iter().any(|pc| pc.pilot == pilot)
    }

    pub fn channel_of(&self, pilot: PilotId) -> Option<&Channel> {
        self.pilot_channels.iter().find(|pc| pc.pilot == pilot).map(|pc| &pc.channel)
    }

    pub fn pilot_on_channel(&self, channel: ChannelId) -> Option<PilotId> {
        self.pilot_channels.iter().find(|pc| pc.channel.id == channel).map(|pc| pc.pilot)
    }

    /// True when no assigned channel shares the channel or its frequency.
    pub fn is_frequency_free(&self, channel: &Channel) -> bool {
        !self.channels().any(|c| c.interferes_with(channel))
    }

    /// Put `pilot` on `channel`, moving them off any channel they held.
    pub fn set_pilot(&mut self, channel: &Channel, pilot: PilotId) -> Result<()> {
        if let Some(holder) = self
            .pilot_channels
            .iter()
            .find(|pc| pc.pilot != pilot && pc.channel.interferes_with(channel))
        {
            return Err(RaceError::ChannelOccupied { channel: channel.id, pilot: holder.pilot });
        }
        self.pilot_channels.retain(|pc| pc.pilot != pilot);
        self.pilot_channels.push(PilotChannel { pilot, channel: channel.clone() });
        Ok(())
    }

    pub fn remove_pilot(&mut self, pilot: PilotId) -> bool {
        let before = self.pilot_channels.len();
        self.pilot_channels.retain(|pc| pc.pilot != pilot);
        before != self.pilot_channels.len()
    }

    // ── Timing records ────────────────────────────────────────────────────────

    /// All detections in arrival order, valid or not.
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn detection(&self, id: DetectionId) -> Option<&Detection> {
        self.detections.iter().find(|d| d.id == id)
    }

    /// The pilot's detections in timestamp order.
    pub fn detections_for(&self, pilot: PilotId) -> Vec<&Detection> {
        let mut detections: Vec<&Detection> =
            self.detections.iter().filter(|d| d.pilot == pilot).collect();
        detections.sort_by_key(|d| d.time);
        detections
    }

    /// Valid laps of every pilot, ordered by pilot then lap number.
    pub fn laps(&self) -> &[Lap] {
        &self.laps
    }

    pub fn lap(&self, id: LapId) -> Option<&Lap> {
        self.laps.iter().find(|l| l.id == id)
    }

    /// The pilot's laps in lap-number order, holeshot included.
    pub fn laps_for(&self, pilot: PilotId) -> Vec<&Lap> {
        let mut laps: Vec<&Lap> = self.laps.iter().filter(|l| l.pilot == pilot).collect();
        laps.sort_by_key(|l| l.number);
        laps
    }

    /// Laps that count towards the target, i.e. excluding the holeshot.
    pub fn completed_laps(&self, pilot: PilotId) -> usize {
        self.laps.iter().filter(|l| l.pilot == pilot && !l.is_holeshot()).count()
    }

    pub fn pilot_finished(&self, pilot: PilotId) -> bool {
        self.target_laps > 0 && self.completed_laps(pilot) >= self.target_laps as usize
    }

    /// Splits between consecutive valid detections of the pilot, the first
    /// one measured from the race start.
    pub fn splits_for(&self, pilot: PilotId) -> Vec<Split> {
        let mut splits = Vec::new();
        let mut previous = self.start;
        for detection in self.detections_for(pilot).into_iter().filter(|d| d.valid) {
            let start = previous.unwrap_or(detection.time);
            splits.push(Split::ending_at(detection, start));
            previous = Some(detection.time);
        }
        splits
    }

    /// The split closed by a given detection, if that detection is valid.
    pub fn split_for(&self, detection: DetectionId) -> Option<Split> {
        let pilot = self.detection(detection)?.pilot;
        self.splits_for(pilot).into_iter().find(|s| s.detection == detection)
    }

    /// Splits of every pilot in the race.
    pub fn all_splits(&self) -> Vec<Split> {
        let pilots: HashSet<PilotId> = self.detections.iter().map(|d| d.pilot).collect();
        pilots.into_iter().flat_map(|pilot| self.splits_for(pilot)).collect()
    }

    /// Restore lap back-references after the race was loaded from a store.
    pub fn relink_laps(&mut self) {
        let id = self.id;
        for lap in &mut self.laps {
            lap.race = Some(id);
        }
    }

    // ── Assembler access ──────────────────────────────────────────────────────

    pub(crate) fn push_detection(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    pub(crate) fn detection_mut(&mut self, id: DetectionId) -> Option<&mut Detection> {
        self.detections.iter_mut().find(|d| d.id == id)
    }

    pub(crate) fn detections_mut(&mut self) -> &mut [Detection] {
        &mut self.detections
    }

    /// Take ownership of a lap and point it back at this race.
    pub(crate) fn adopt_lap(&mut self, mut lap: Lap) -> Lap {
        lap.race = Some(self.id);
        self.laps.push(lap.clone());
        lap
    }

    /// Swap the pilot's laps for a re-derived set, returning the ids dropped.
    pub(crate) fn replace_laps_for(&mut self, pilot: PilotId, laps: Vec<Lap>) -> Vec<LapId> {
        let kept: HashSet<LapId> = laps.iter().map(|l| l.id).collect();
        let removed = self
            .laps
            .iter()
            .filter(|l| l.pilot == pilot && !kept.contains(&l.id))
            .map(|l| l.id)
            .collect();
        self.laps.retain(|l| l.pilot != pilot);
        for lap in laps {
            self.adopt_lap(lap);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, raceband};

    #[test]
    fn lifecycle_transitions() {
        let mut race = Race::new(RoundId::new(), 1);
        assert_eq!(race.state(), RaceState::NotStarted);
        assert!(race.pause_at(at(0.0)).is_err());

        race.start_at(at(0.0)).expect("start");
        race.pause_at(at(10.0)).expect("pause");
        race.resume_at(at(15.0)).expect("resume");
        race.end_at(at(40.0)).expect("end");

        assert!(race.ended());
        assert_eq!(race.total_paused(), Duration::from_secs(5));
        assert_eq!(race.race_time(at(100.0)), Duration::from_secs(35));
        assert!(matches!(
            race.start_at(at(50.0)),
            Err(RaceError::InvalidTransition { from: RaceState::Ended, .. })
        ));
    }

    #[test]
    fn ending_while_paused_accumulates_pause() {
        let mut race = Race::new(RoundId::new(), 1);
        race.start_at(at(0.0)).expect("start");
        race.pause_at(at(20.0)).expect("pause");
        assert_eq!(race.race_time(at(25.0)), Duration::from_secs(20));
        race.end_at(at(30.0)).expect("end");
        assert_eq!(race.total_paused(), Duration::from_secs(10));
    }

    #[test]
    fn channel_held_by_one_pilot_only() {
        let channels = raceband();
        let mut race = Race::new(RoundId::new(), 1);
        let (a, b) = (PilotId::new(), PilotId::new());

        race.set_pilot(&channels[0], a).expect("assign a");
        assert!(matches!(
            race.set_pilot(&channels[0], b),
            Err(RaceError::ChannelOccupied { pilot, .. }) if pilot == a
        ));

        race.set_pilot(&channels[1], b).expect("assign b");
        race.set_pilot(&channels[2], a).expect("move a");
        assert_eq!(race.pilot_count(), 2);
        assert_eq!(race.channel_of(a).map(|c| c.number), Some(3));
        assert!(race.is_frequency_free(&channels[0]));
        assert_eq!(race.pilot_on_channel(channels[1].id), Some(b));
        assert!(race.remove_pilot(b));
        assert!(!race.has_pilot(b));
    }

    #[test]
    fn same_frequency_on_another_band_is_occupied() {
        let mut race = Race::new(RoundId::new(), 1);
        let r7 = Channel::new(crate::types::Band::RaceBand, 7, 5880);
        let f8 = Channel::new(crate::types::Band::Fatshark, 8, 5880);
        race.set_pilot(&r7, PilotId::new()).expect("assign");
        assert!(!race.is_frequency_free(&f8));
        assert!(race.set_pilot(&f8, PilotId::new()).is_err());
    }

    #[test]
    fn relink_sets_back_references() {
        let mut race = Race::new(RoundId::new(), 1);
        race.start_at(at(0.0)).expect("start");
        let detection = Detection::new(
            crate::types::TimingSystemType::Dummy,
            0,
            PilotId::new(),
            ChannelId::new(),
            at(3.0),
            0,
            true,
            90,
        );
        let lap = race.adopt_lap(Lap::new(&detection, at(0.0)));
        assert_eq!(lap.race, Some(race.id));

        let yaml = serde_yaml_ng::to_string(&race).expect("serialize");
        let mut loaded: Race = serde_yaml_ng::from_str(&yaml).expect("deserialize");
        for lap in loaded.laps.iter_mut() {
            lap.race = None;
        }
        loaded.relink_laps();
        assert!(loaded.laps().iter().all(|l| l.race == Some(race.id)));
    }
}
