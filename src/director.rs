//! The race director owns an event's races and runs the detection pipeline.
//!
//! ```text
//! TimingSource ─► Driver task ─► DetectionValidator ─► LapAssembler ─► SpeedRecordTracker
//!                                      (race lock held)                 (tracker lock)
//! ```
//!
//! ## Locking
//!
//! Each race lives in its own slot behind a [`parking_lot::Mutex`]; the race
//! map is only locked long enough to find a slot, so work on different races
//! never contends. The speed tracker has its own lock. Lock order is tracker,
//! then race: code holding a race lock never takes the tracker, while
//! scoring and record rebuilds read splits with the tracker held so they
//! serialise against each other. No lock is held across an `.await`.
//!
//! Ending a race takes the race lock, so a detection is either fully applied
//! before the end or refused after it.
//!
//! ## Notifications
//!
//! - [`RaceDirector::subscribe`] - pipeline events ([`RaceEvent`])
//! - [`RaceDirector::speed_events`] - speed records ([`SpeedEvent`])
//! - [`RaceDirector::race_updates`] - race snapshots, optionally throttled

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assembler::{Assembled, AutoRejection, LapAssembler, Rederived, ValidityChange};
use crate::config::EventConfig;
use crate::detection::{Detection, ValidityType};
use crate::driver::{Driver, SourceHandle};
use crate::format::{FormatContext, GeneratedRound, RoundFormat, RoundPlan};
use crate::race::{Lap, PrimaryTimingSystemLocation, Race, RaceState, Round, RoundType, Split};
use crate::speed::{BestSpeed, SpeedEvent, SpeedRecordTracker, TrackerState};
use crate::stream::ThrottleExt;
use crate::timing::{DetectionValidator, RawDetection, TimingSource};
use crate::types::{
    Channel, ChannelId, DetectionId, Pilot, PilotId, RaceId, RoundId, Sector, TimingSystemIndex,
    TimingSystemType, Units, UpdateRate, speed_to_string,
};
use crate::{RaceError, Result};

/// Pipeline notifications.
#[derive(Debug, Clone)]
pub enum RaceEvent {
    RaceAdded { race: RaceId, round: RoundId },
    RaceStateChanged { race: RaceId, state: RaceState },
    CurrentRaceChanged { race: RaceId },
    /// A detection was stored, possibly as invalid
    DetectionRecorded {
        race: RaceId,
        detection: DetectionId,
        pilot: PilotId,
        lap_number: u32,
        rejected: Option<AutoRejection>,
    },
    LapCompleted { race: RaceId, lap: Lap },
    /// A pilot's laps were rebuilt after an edit or a late detection
    PilotRederived { race: RaceId, rederived: Rederived },
    RoundGenerated { round: RoundId, races: Vec<RaceId>, unassigned: Vec<PilotId> },
    SourceFinished { source: String },
    SourceFailed { source: String, reason: String },
}

struct RaceSlot {
    race: Mutex<Race>,
    updates: watch::Sender<Arc<Race>>,
}

impl RaceSlot {
    fn new(race: Race) -> Self {
        let (updates, _) = watch::channel(Arc::new(race.clone()));
        Self { race: Mutex::new(race), updates }
    }

    fn publish(&self, race: &Race) {
        self.updates.send_replace(Arc::new(race.clone()));
    }
}

struct Shared {
    validator: DetectionValidator,
    assembler: LapAssembler,
    primary_timing_system_location: PrimaryTimingSystemLocation,
    units: Units,
    pilots: RwLock<HashMap<PilotId, Pilot>>,
    races: RwLock<HashMap<RaceId, Arc<RaceSlot>>>,
    rounds: RwLock<Vec<Round>>,
    current: RwLock<Option<RaceId>>,
    tracker: Mutex<SpeedRecordTracker>,
    events: broadcast::Sender<RaceEvent>,
    shutdown: CancellationToken,
}

/// Owns the races of one event and feeds them from timing sources.
///
/// Cheap to clone; clones share the same event.
#[derive(Clone)]
pub struct RaceDirector {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RaceDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaceDirector")
            .field("races", &self.shared.races.read().len())
            .field("rounds", &self.shared.rounds.read().len())
            .field("current", &*self.shared.current.read())
            .finish()
    }
}

impl Default for RaceDirector {
    fn default() -> Self {
        Self::new(&EventConfig::default())
    }
}

impl RaceDirector {
    pub fn new(config: &EventConfig) -> Self {
        let mut tracker = SpeedRecordTracker::new();
        tracker.initialize(&config.timing_system_order(), &config.sectors, Vec::new());
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));

        info!(event = %config.name, sectors = config.sectors.len(), "Race director ready");
        Self {
            shared: Arc::new(Shared {
                validator: DetectionValidator::new(config.validator_config()),
                assembler: LapAssembler::new(config.assembler_config()),
                primary_timing_system_location: config.primary_timing_system_location,
                units: config.units,
                pilots: RwLock::new(HashMap::new()),
                races: RwLock::new(HashMap::new()),
                rounds: RwLock::new(Vec::new()),
                current: RwLock::new(None),
                tracker: Mutex::new(tracker),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn validator(&self) -> &DetectionValidator {
        &self.shared.validator
    }

    pub fn assembler(&self) -> &LapAssembler {
        &self.shared.assembler
    }

    pub fn primary_timing_system_location(&self) -> PrimaryTimingSystemLocation {
        self.shared.primary_timing_system_location
    }

    /// Display units for speeds.
    pub fn units(&self) -> Units {
        self.shared.units
    }

    // ── Pilots ────────────────────────────────────────────────────────────────

    /// Register a pilot, replacing any earlier entry with the same id.
    pub fn add_pilot(&self, pilot: Pilot) -> PilotId {
        let id = pilot.id;
        debug!(pilot = %id, name = %pilot.name, practice = pilot.practice, "Pilot registered");
        self.shared.pilots.write().insert(id, pilot);
        id
    }

    pub fn pilot(&self, id: PilotId) -> Option<Pilot> {
        self.shared.pilots.read().get(&id).cloned()
    }

    /// Registered pilots by name.
    pub fn pilots(&self) -> Vec<Pilot> {
        let mut pilots: Vec<Pilot> = self.shared.pilots.read().values().cloned().collect();
        pilots.sort_by(|a, b| a.name.cmp(&b.name));
        pilots
    }

    // ── Notifications ─────────────────────────────────────────────────────────

    /// Subscribe to pipeline events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RaceEvent> {
        self.shared.events.subscribe()
    }

    /// Pipeline events as a stream. Lagged events are skipped.
    pub fn events(&self) -> impl Stream<Item = RaceEvent> + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|event| async move { event.ok() })
    }

    /// Subscribe to speed record notifications.
    pub fn speed_events(&self) -> broadcast::Receiver<SpeedEvent> {
        self.shared.tracker.lock().subscribe()
    }

    pub(crate) fn publish(&self, event: RaceEvent) {
        // No receivers is fine
        let _ = self.shared.events.send(event);
    }

    // ── Rounds ────────────────────────────────────────────────────────────────

    pub fn add_round(&self, round: Round) -> RoundId {
        let id = round.id;
        info!(round = %round, "Round added");
        self.shared.rounds.write().push(round);
        id
    }

    pub fn round(&self, id: RoundId) -> Option<Round> {
        self.shared.rounds.read().iter().find(|r| r.id == id).cloned()
    }

    /// Rounds in event order.
    pub fn rounds(&self) -> Vec<Round> {
        let mut rounds = self.shared.rounds.read().clone();
        rounds.sort_by_key(|r| r.number);
        rounds
    }

    fn next_round_number(&self) -> u32 {
        self.shared.rounds.read().iter().map(|r| r.number).max().unwrap_or(0) + 1
    }

    // ── Races ─────────────────────────────────────────────────────────────────

    /// Take ownership of a race, e.g. one loaded from the external store.
    ///
    /// # Errors
    ///
    /// [`RaceError::RoundAutoGenerated`] when the race belongs to a round
    /// whose races come from a format; use [`Self::generate_round`].
    pub fn add_race(&self, race: Race) -> Result<RaceId> {
        if let Some(round) = self.round(race.round)
            && round.round_type.auto_generated()
        {
            return Err(RaceError::RoundAutoGenerated { round: round.id, round_type: round.round_type });
        }
        Ok(self.insert_race(race))
    }

    fn insert_race(&self, mut race: Race) -> RaceId {
        race.relink_laps();
        let (id, round) = (race.id, race.round);
        debug!(race = %id, number = race.race_number, "Race added");
        self.shared.races.write().insert(id, Arc::new(RaceSlot::new(race)));
        self.publish(RaceEvent::RaceAdded { race: id, round });
        id
    }

    fn slot(&self, id: RaceId) -> Result<Arc<RaceSlot>> {
        self.shared.races.read().get(&id).cloned().ok_or(RaceError::RaceNotFound { race: id })
    }

    fn slots(&self) -> Vec<Arc<RaceSlot>> {
        self.shared.races.read().values().cloned().collect()
    }

    /// Run `f` under the race lock and publish a snapshot if it succeeds.
    fn with_race<T>(&self, id: RaceId, f: impl FnOnce(&mut Race) -> Result<T>) -> Result<T> {
        let slot = self.slot(id)?;
        let mut race = slot.race.lock();
        let out = f(&mut race)?;
        slot.publish(&race);
        Ok(out)
    }

    /// Latest snapshot of a race.
    pub fn race_snapshot(&self, id: RaceId) -> Result<Arc<Race>> {
        Ok(self.slot(id)?.updates.borrow().clone())
    }

    /// Snapshots of every race, ordered by round then race number.
    pub fn races(&self) -> Vec<Arc<Race>> {
        let order: HashMap<RoundId, u32> =
            self.shared.rounds.read().iter().map(|r| (r.id, r.number)).collect();
        let mut races: Vec<Arc<Race>> =
            self.slots().iter().map(|slot| slot.updates.borrow().clone()).collect();
        races.sort_by_key(|r| (order.get(&r.round).copied().unwrap_or(u32::MAX), r.race_number));
        races
    }

    pub fn races_in_round(&self, round: RoundId) -> Vec<Arc<Race>> {
        self.races().into_iter().filter(|r| r.round == round).collect()
    }

    /// Stream of race snapshots, starting with the current one.
    ///
    /// With [`UpdateRate::Max`] snapshots are throttled, latest wins.
    pub fn race_updates(&self, id: RaceId, rate: UpdateRate) -> Result<BoxStream<'static, Arc<Race>>> {
        let snapshots = WatchStream::new(self.slot(id)?.updates.subscribe());
        Ok(match rate.throttle_interval() {
            None => snapshots.boxed(),
            Some(interval) => snapshots.throttle(interval).boxed(),
        })
    }

    pub fn set_current_race(&self, id: RaceId) -> Result<()> {
        self.slot(id)?;
        *self.shared.current.write() = Some(id);
        info!(race = %id, "Current race selected");
        self.publish(RaceEvent::CurrentRaceChanged { race: id });
        Ok(())
    }

    pub fn current_race(&self) -> Option<RaceId> {
        *self.shared.current.read()
    }

    pub fn assign_pilot(&self, race: RaceId, channel: &Channel, pilot: PilotId) -> Result<()> {
        self.with_race(race, |r| r.set_pilot(channel, pilot))
    }

    pub fn remove_pilot(&self, race: RaceId, pilot: PilotId) -> Result<bool> {
        self.with_race(race, |r| Ok(r.remove_pilot(pilot)))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn start_race(&self, race: RaceId, at: DateTime<Utc>) -> Result<()> {
        self.transition(race, |r| r.start_at(at))
    }

    pub fn pause_race(&self, race: RaceId, at: DateTime<Utc>) -> Result<()> {
        self.transition(race, |r| r.pause_at(at))
    }

    pub fn resume_race(&self, race: RaceId, at: DateTime<Utc>) -> Result<()> {
        self.transition(race, |r| r.resume_at(at))
    }

    /// End a race. Detections arriving afterwards are refused.
    pub fn end_race(&self, race: RaceId, at: DateTime<Utc>) -> Result<()> {
        self.transition(race, |r| r.end_at(at))
    }

    fn transition(&self, id: RaceId, change: impl FnOnce(&mut Race) -> Result<()>) -> Result<()> {
        let state = self.with_race(id, |race| {
            change(race)?;
            Ok(race.state())
        })?;
        info!(race = %id, ?state, "Race state changed");
        self.publish(RaceEvent::RaceStateChanged { race: id, state });
        Ok(())
    }

    /// Discard a race's timing records and put it back to `NotStarted`.
    pub fn reset_race(&self, id: RaceId) -> Result<()> {
        let pilots: Vec<PilotId> = self.with_race(id, |race| {
            let pilots = race.detections().iter().map(|d| d.pilot).collect::<Vec<_>>();
            race.reset();
            Ok(pilots)
        })?;
        info!(race = %id, "Race reset");
        self.publish(RaceEvent::RaceStateChanged { race: id, state: RaceState::NotStarted });

        let mut pilots = pilots;
        pilots.sort();
        pilots.dedup();
        for pilot in pilots {
            self.recompute_pilot(pilot);
        }
        Ok(())
    }

    // ── Detections ────────────────────────────────────────────────────────────

    /// Feed a raw detection to the current race.
    pub fn ingest(&self, raw: RawDetection) -> Result<Assembled> {
        let race = self.current_race().ok_or(RaceError::NoCurrentRace)?;
        self.ingest_for(race, raw)
    }

    /// Feed a raw detection to a given race.
    ///
    /// # Errors
    ///
    /// Anything the validator or the assembler refuses; the race is unchanged.
    pub fn ingest_for(&self, race: RaceId, raw: RawDetection) -> Result<Assembled> {
        let assembled = self.with_race(race, |r| {
            let detection = self.shared.validator.validate(&raw, r.pilot_on_channel(raw.channel))?;
            self.shared.assembler.assemble(r, detection)
        })?;
        self.after_detection(race, &assembled);
        Ok(assembled)
    }

    /// Record a crossing the timing hardware missed, in any race state.
    pub fn add_manual_detection(
        &self,
        race: RaceId,
        channel: ChannelId,
        timing_system_index: TimingSystemIndex,
        time: DateTime<Utc>,
        is_lap_end: bool,
    ) -> Result<Assembled> {
        let assembled = self.with_race(race, |r| {
            let pilot = r.pilot_on_channel(channel).ok_or(RaceError::UnassignedChannel { channel })?;
            let mut detection = Detection::new(
                TimingSystemType::Manual,
                timing_system_index,
                pilot,
                channel,
                time,
                0,
                is_lap_end,
                0,
            );
            detection.validity_type = ValidityType::ManualOverride;
            self.shared.assembler.insert(r, detection)
        })?;
        info!(race = %race, pilot = %assembled.pilot, lap = assembled.lap_number, "Manual detection added");
        self.after_detection(race, &assembled);
        Ok(assembled)
    }

    fn after_detection(&self, race: RaceId, assembled: &Assembled) {
        self.publish(RaceEvent::DetectionRecorded {
            race,
            detection: assembled.detection,
            pilot: assembled.pilot,
            lap_number: assembled.lap_number,
            rejected: assembled.rejected,
        });
        if let Some(lap) = &assembled.lap {
            self.publish(RaceEvent::LapCompleted { race, lap: lap.clone() });
        }

        if let Some(rederived) = &assembled.rederived {
            self.publish(RaceEvent::PilotRederived { race, rederived: rederived.clone() });
            self.recompute_pilot(assembled.pilot);
        } else if assembled.split.is_some() {
            self.score_split(race, assembled.detection);
        }
    }

    /// Check the split a detection closes, as the race holds it now. An edit
    /// that landed after the detection was stored wins.
    fn score_split(&self, race: RaceId, detection: DetectionId) {
        let mut tracker = self.shared.tracker.lock();
        let Ok(slot) = self.slot(race) else {
            return;
        };
        let split = slot.race.lock().split_for(detection);
        match split {
            Some(split) => {
                tracker.check_split(&split);
            }
            None => debug!(race = %race, detection = %detection, "Split withdrawn before scoring"),
        }
    }

    /// Operator disqualification; the pilot's laps and speed record are rebuilt.
    pub fn disqualify(&self, race: RaceId, detection: DetectionId) -> Result<ValidityChange> {
        self.edit_validity(race, |r| self.shared.assembler.disqualify(r, detection))
    }

    /// Operator reinstatement; the pilot's laps and speed record are rebuilt.
    pub fn reinstate(&self, race: RaceId, detection: DetectionId) -> Result<ValidityChange> {
        self.edit_validity(race, |r| self.shared.assembler.reinstate(r, detection))
    }

    fn edit_validity(
        &self,
        race: RaceId,
        edit: impl FnOnce(&mut Race) -> Result<ValidityChange>,
    ) -> Result<ValidityChange> {
        let change = self.with_race(race, edit)?;
        info!(
            race = %race,
            pilot = %change.pilot,
            detection = %change.detection,
            lap_boundary = change.was_lap_boundary,
            "Detection validity changed"
        );
        self.publish(RaceEvent::PilotRederived { race, rederived: change.rederived.clone() });
        self.recompute_pilot(change.pilot);
        Ok(change)
    }

    // ── Speeds ────────────────────────────────────────────────────────────────

    /// The pilot's splits across every started race.
    pub fn pilot_splits(&self, pilot: PilotId) -> Vec<Split> {
        self.slots()
            .iter()
            .flat_map(|slot| {
                let race = slot.race.lock();
                if race.started() { race.splits_for(pilot) } else { Vec::new() }
            })
            .collect()
    }

    /// Splits of every pilot across every started race.
    pub fn all_splits(&self) -> Vec<Split> {
        self.slots()
            .iter()
            .flat_map(|slot| {
                let race = slot.race.lock();
                if race.started() { race.all_splits() } else { Vec::new() }
            })
            .collect()
    }

    /// Rebuild one pilot's record. Splits are read under the tracker lock so
    /// a concurrent [`Self::score_split`] lands either before or after it.
    fn recompute_pilot(&self, pilot: PilotId) {
        let mut tracker = self.shared.tracker.lock();
        let splits = self.pilot_splits(pilot);
        tracker.update_pilot(pilot, splits);
    }

    /// Replace the flight path and rebuild every speed record.
    pub fn set_flight_path(&self, timing_systems: &[TimingSystemIndex], sectors: &[Sector]) {
        let mut tracker = self.shared.tracker.lock();
        let splits = self.all_splits();
        tracker.initialize(timing_systems, sectors, splits);
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.shared.tracker.lock().state()
    }

    pub fn best_speed(&self, pilot: PilotId) -> Option<BestSpeed> {
        self.shared.tracker.lock().best_speed(pilot)
    }

    /// Speed of a split in m/s, 0 when unknown.
    pub fn speed(&self, split: &Split) -> f32 {
        self.shared.tracker.lock().speed(split)
    }

    /// A pilot's best speed in the event's display units, e.g. `"90 km/h"`.
    pub fn best_speed_text(&self, pilot: PilotId) -> Option<String> {
        self.best_speed(pilot).map(|best| speed_to_string(best.speed, self.shared.units))
    }

    /// Registered pilots with a speed record, fastest first. Practice pilots
    /// are left out.
    pub fn speed_standings(&self) -> Vec<(Pilot, BestSpeed)> {
        let pilots: Vec<Pilot> =
            self.shared.pilots.read().values().filter(|p| !p.practice).cloned().collect();
        let tracker = self.shared.tracker.lock();
        let mut standings: Vec<(Pilot, BestSpeed)> = pilots
            .into_iter()
            .filter_map(|pilot| tracker.best_speed(pilot.id).map(|best| (pilot, best)))
            .collect();
        standings.sort_by(|a, b| b.1.speed.total_cmp(&a.1.speed));
        standings
    }

    /// Event-wide best speed in m/s.
    pub fn max_speed(&self) -> f32 {
        self.shared.tracker.lock().max_speed()
    }

    // ── Round generation ──────────────────────────────────────────────────────

    /// Create the next round and fill it with `format`.
    ///
    /// # Errors
    ///
    /// - [`RaceError::RoundNotFound`] for an unknown calling round
    /// - [`RaceError::RoundNotComplete`] while a race of the calling round has
    ///   not ended
    pub fn generate_round(
        &self,
        format: &dyn RoundFormat,
        round_type: RoundType,
        plan: &RoundPlan,
    ) -> Result<GeneratedRound> {
        let calling_races: Vec<Race> = match plan.calling_round {
            Some(calling) => {
                if self.round(calling).is_none() {
                    return Err(RaceError::RoundNotFound { round: calling });
                }
                let races: Vec<Race> =
                    self.races_in_round(calling).iter().map(|r| Race::clone(r)).collect();
                let unfinished = races.iter().filter(|r| !r.ended()).count();
                if unfinished > 0 {
                    return Err(RaceError::RoundNotComplete { round: calling, unfinished });
                }
                races
            }
            None => Vec::new(),
        };

        let round = Round::new(self.next_round_number(), round_type);
        let context = FormatContext::new(&calling_races, self.primary_timing_system_location());
        let generated = format.generate_round(&context, &[], &round, plan);
        if generated.is_empty() {
            debug!(format = format.name(), "Format produced no races");
            return Ok(generated);
        }

        let round_id = self.add_round(round);
        let races: Vec<RaceId> = generated.races.iter().map(|race| self.insert_race(race.clone())).collect();
        info!(
            round = %round_id,
            format = format.name(),
            races = races.len(),
            unassigned = generated.unassigned.len(),
            "Round generated"
        );
        self.publish(RaceEvent::RoundGenerated {
            round: round_id,
            races,
            unassigned: generated.unassigned.clone(),
        });
        Ok(generated)
    }

    // ── Timing sources ────────────────────────────────────────────────────────

    /// Spawn a task reading `source` into the current race.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<S: TimingSource>(&self, source: S) -> SourceHandle {
        Driver::spawn(source, self.clone(), self.shared.shutdown.child_token())
    }

    /// Stop every attached source.
    pub fn shutdown(&self) {
        info!("Race director shutting down");
        self.shared.shutdown.cancel();
    }
}
