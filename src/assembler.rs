//! Lap assembly: detections in, laps and splits out.
//!
//! The assembler works on a `&mut Race` the caller already holds exclusively,
//! so a detection is either applied completely or not at all.
//!
//! Lap numbering is a pure function of a pilot's valid detections in timestamp
//! order: a detection's lap number is the count of valid lap-end detections
//! before it, plus one for races timed at the end of the lap. Appending a
//! detection in order and re-deriving the pilot from scratch give the same
//! result; the append path is just cheaper.
//!
//! Auto-validated detections may be invalidated during placement:
//! - a lap end closer than the minimum lap time to the previous lap end
//! - a second valid detection for the same race sector
//!
//! Manual overrides keep the validity the operator gave them and win a race
//! sector over Auto detections, earlier or later. Two valid overrides never
//! share a sector: the later one is invalidated during re-derivation, and an
//! insert or reinstate that would cause that is refused.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detection::{Detection, ValidityType};
use crate::race::{Lap, Race, RaceState, Split, elapsed};
use crate::timing::DetectionValidator;
use crate::types::{DetectionId, LapId, PilotId};
use crate::{RaceError, Result};

/// What to do with a detection older than the pilot's last processed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Refuse it with [`RaceError::OutOfOrder`]
    #[default]
    Reject,
    /// Insert it at its timestamp and re-derive the pilot's laps
    Resequence,
}

/// Lap assembly rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssemblerConfig {
    pub ordering: OrderingPolicy,
    /// Lap ends closer than this to the previous one are recorded as invalid
    pub min_lap_time: Option<Duration>,
}

/// Why the pipeline marked a detection invalid on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoRejection {
    MinLapTime,
    DuplicateRaceSector,
}

/// Result of feeding one detection to a race.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub detection: DetectionId,
    pub pilot: PilotId,
    pub lap_number: u32,
    /// `None` when the detection was recorded as valid
    pub rejected: Option<AutoRejection>,
    /// New lap, when the detection closed one
    pub lap: Option<Lap>,
    /// Split closed by the detection, when valid
    pub split: Option<Split>,
    /// Set when the detection arrived out of order and the pilot was re-derived
    pub rederived: Option<Rederived>,
}

/// Result of re-deriving one pilot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rederived {
    pub pilot: PilotId,
    /// Laps whose terminating detection is no longer a valid lap end
    pub removed_laps: Vec<LapId>,
    /// Detections whose lap number changed
    pub renumbered: usize,
    /// Auto detections that gave their race sector up to a manual override
    pub displaced: Vec<DetectionId>,
    /// Manual overrides invalidated because an earlier override holds their
    /// race sector
    pub demoted: Vec<DetectionId>,
}

/// Result of a manual validity edit.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityChange {
    pub detection: DetectionId,
    pub pilot: PilotId,
    /// Whether the edited detection closed a lap before the edit
    pub was_lap_boundary: bool,
    pub rederived: Rederived,
}

/// Running state of one pilot while walking their detections in time order.
#[derive(Debug, Default)]
struct PilotProgress {
    lap_ends: u32,
    last_valid: Option<DateTime<Utc>>,
    last_lap_end: Option<DateTime<Utc>>,
    /// Valid race sectors and the detection holding each
    sectors: HashMap<u32, (DetectionId, ValidityType)>,
}

/// Where a placed detection sits relative to earlier boundaries.
#[derive(Default)]
struct Placement {
    rejected: Option<AutoRejection>,
    split_start: Option<DateTime<Utc>>,
    lap_start: Option<DateTime<Utc>>,
    /// Auto detection holding the sector a manual override claims
    displaces: Option<DetectionId>,
    /// Set when a manual override lost its sector to an earlier override
    demoted: bool,
}

impl PilotProgress {
    /// Progress after the pilot's currently valid detections.
    fn of(race: &Race, pilot: PilotId) -> Self {
        let mut progress = Self::default();
        for detection in race.detections_for(pilot).into_iter().filter(|d| d.valid) {
            progress.advance(detection);
        }
        progress
    }

    fn advance(&mut self, detection: &Detection) {
        self.last_valid = Some(detection.time);
        self.sectors.insert(detection.race_sector(), (detection.id, detection.validity_type));
        if detection.is_lap_end {
            self.lap_ends += 1;
            self.last_lap_end = Some(detection.time);
        }
    }

    /// Number `detection`, decide its validity and advance past it.
    ///
    /// Auto detections listed in `displaced` lose their sector regardless of
    /// what precedes them. A manual override claiming a sector held by an
    /// Auto detection is not placed; the caller displaces the holder and
    /// walks again.
    fn place(
        &mut self,
        detection: &mut Detection,
        first_lap: u32,
        min_lap_time: Option<Duration>,
        race_start: DateTime<Utc>,
        displaced: &HashSet<DetectionId>,
    ) -> Placement {
        detection.lap_number = self.lap_ends + first_lap;
        let holder = self.sectors.get(&detection.race_sector()).copied();

        let mut rejected = None;
        let mut demoted = false;
        match detection.validity_type {
            ValidityType::Auto => {
                if displaced.contains(&detection.id) {
                    rejected = Some(AutoRejection::DuplicateRaceSector);
                } else if detection.is_lap_end
                    && let (Some(min), Some(previous)) = (min_lap_time, self.last_lap_end)
                    && elapsed(previous, detection.time) < min
                {
                    rejected = Some(AutoRejection::MinLapTime);
                } else if holder.is_some() {
                    rejected = Some(AutoRejection::DuplicateRaceSector);
                }
                detection.valid = rejected.is_none();
            }
            ValidityType::ManualOverride if detection.valid => match holder {
                Some((holder, ValidityType::Auto)) => {
                    return Placement { displaces: Some(holder), ..Placement::default() };
                }
                Some((_, ValidityType::ManualOverride)) => {
                    detection.valid = false;
                    demoted = true;
                }
                None => {}
            },
            ValidityType::ManualOverride => {}
        }

        if !detection.valid {
            return Placement { rejected, demoted, ..Placement::default() };
        }

        let split_start = Some(self.last_valid.unwrap_or(race_start));
        let lap_start = detection.is_lap_end.then(|| self.last_lap_end.unwrap_or(race_start));
        self.advance(detection);
        Placement { rejected, split_start, lap_start, ..Placement::default() }
    }
}

/// Converts a pilot's detection stream into laps and splits.
#[derive(Debug, Clone, Default)]
pub struct LapAssembler {
    config: AssemblerConfig,
}

impl LapAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Feed a validated detection to a running race.
    ///
    /// # Errors
    ///
    /// - [`RaceError::RaceNotRunning`] unless the race is running
    /// - [`RaceError::OutOfOrder`] for a detection before the race start, or
    ///   before the pilot's last processed detection under
    ///   [`OrderingPolicy::Reject`]
    pub fn assemble(&self, race: &mut Race, mut detection: Detection) -> Result<Assembled> {
        if race.state() != RaceState::Running {
            return Err(RaceError::RaceNotRunning { race: race.id, state: race.state() });
        }
        let race_start = race.start().unwrap_or(detection.time);
        if detection.time < race_start {
            return Err(RaceError::OutOfOrder {
                pilot: detection.pilot,
                time: detection.time,
                last: race_start,
            });
        }

        if detection.is_manual() {
            return self.insert(race, detection);
        }

        let last_processed = race.detections_for(detection.pilot).last().map(|d| d.time);
        if let Some(last) = last_processed
            && detection.time < last
        {
            return match self.config.ordering {
                OrderingPolicy::Reject => {
                    warn!(
                        race = %race.id,
                        pilot = %detection.pilot,
                        behind_ms = (last - detection.time).num_milliseconds(),
                        "Rejecting out of order detection"
                    );
                    Err(RaceError::OutOfOrder { pilot: detection.pilot, time: detection.time, last })
                }
                OrderingPolicy::Resequence => {
                    debug!(race = %race.id, pilot = %detection.pilot, "Resequencing late detection");
                    self.insert(race, detection)
                }
            };
        }

        let pilot = detection.pilot;
        let mut progress = PilotProgress::of(race, pilot);
        let placement = progress.place(
            &mut detection,
            race.primary_timing_system_location.first_lap_number(),
            self.config.min_lap_time,
            race_start,
            &HashSet::new(),
        );

        let split = placement.split_start.map(|start| Split::ending_at(&detection, start));
        let lap = placement.lap_start.map(|start| Lap::new(&detection, start));
        let assembled = Assembled {
            detection: detection.id,
            pilot,
            lap_number: detection.lap_number,
            rejected: placement.rejected,
            lap: lap.map(|lap| race.adopt_lap(lap)),
            split,
            rederived: None,
        };

        match placement.rejected {
            Some(reason) => debug!(race = %race.id, %detection, ?reason, "Detection recorded as invalid"),
            None => debug!(race = %race.id, %detection, lap = assembled.lap.is_some(), "Detection accepted"),
        }
        race.push_detection(detection);
        Ok(assembled)
    }

    /// Insert a detection at its timestamp position regardless of race state,
    /// then re-derive the pilot. Used for late arrivals and operator-added
    /// crossings.
    ///
    /// # Errors
    ///
    /// [`RaceError::RaceSectorTaken`] when a valid manual detection lands on
    /// a race sector another manual detection holds; the race is unchanged.
    pub fn insert(&self, race: &mut Race, detection: Detection) -> Result<Assembled> {
        let id = detection.id;
        let pilot = detection.pilot;
        let backup = (detection.is_manual() && detection.valid).then(|| race.clone());
        race.push_detection(detection);
        let rederived = self.rederive(race, pilot);
        if let Some(backup) = backup {
            Self::refuse_demotion(race, backup, id, &rederived)?;
        }

        let stored = race.detection(id);
        let lap_number = stored.map(|d| d.lap_number).unwrap_or_default();
        let rejected = match stored {
            Some(d) if !d.valid && d.validity_type == ValidityType::Auto => {
                Some(self.rejection_reason(race, d))
            }
            _ => None,
        };
        Ok(Assembled {
            detection: id,
            pilot,
            lap_number,
            rejected,
            lap: race.laps().iter().find(|l| l.detection == id).cloned(),
            split: race.split_for(id),
            rederived: Some(rederived),
        })
    }

    /// Roll `race` back to `backup` if re-derivation invalidated the manual
    /// detection the operator just asked for.
    fn refuse_demotion(
        race: &mut Race,
        backup: Race,
        id: DetectionId,
        rederived: &Rederived,
    ) -> Result<()> {
        if !rederived.demoted.contains(&id) {
            return Ok(());
        }
        let race_sector = race.detection(id).map(Detection::race_sector).unwrap_or_default();
        warn!(race = %race.id, pilot = %rederived.pilot, race_sector, "Manual detection refused");
        *race = backup;
        Err(RaceError::RaceSectorTaken { pilot: rederived.pilot, race_sector })
    }

    fn rejection_reason(&self, race: &Race, detection: &Detection) -> AutoRejection {
        let duplicate = race.detections().iter().any(|d| {
            d.id != detection.id
                && d.valid
                && d.pilot == detection.pilot
                && d.race_sector() == detection.race_sector()
        });
        if duplicate { AutoRejection::DuplicateRaceSector } else { AutoRejection::MinLapTime }
    }

    /// Operator disqualification of a detection; re-derives the pilot.
    pub fn disqualify(&self, race: &mut Race, detection: DetectionId) -> Result<ValidityChange> {
        self.edit_validity(race, detection, DetectionValidator::disqualify)
    }

    /// Operator reinstatement of a detection; re-derives the pilot.
    ///
    /// # Errors
    ///
    /// [`RaceError::RaceSectorTaken`] when another manual detection holds the
    /// race sector the reinstated detection would take; the race is unchanged.
    pub fn reinstate(&self, race: &mut Race, detection: DetectionId) -> Result<ValidityChange> {
        self.edit_validity(race, detection, DetectionValidator::reinstate)
    }

    fn edit_validity(
        &self,
        race: &mut Race,
        id: DetectionId,
        edit: fn(&mut Detection),
    ) -> Result<ValidityChange> {
        let backup = race.clone();
        let detection =
            race.detection_mut(id).ok_or(RaceError::DetectionNotFound { detection: id })?;
        let was_lap_boundary = detection.valid && detection.is_lap_end;
        let pilot = detection.pilot;
        edit(detection);

        let rederived = self.rederive(race, pilot);
        Self::refuse_demotion(race, backup, id, &rederived)?;
        debug!(
            race = %race.id,
            pilot = %pilot,
            detection = %id,
            removed = rederived.removed_laps.len(),
            renumbered = rederived.renumbered,
            "Detection validity edited"
        );
        Ok(ValidityChange { detection: id, pilot, was_lap_boundary, rederived })
    }

    /// Recompute lap numbers, validity and laps for one pilot from their
    /// detections in timestamp order. Lap ids survive for laps whose
    /// terminating detection still closes a lap.
    pub fn rederive(&self, race: &mut Race, pilot: PilotId) -> Rederived {
        let first_lap = race.primary_timing_system_location.first_lap_number();
        let existing: HashMap<DetectionId, LapId> =
            race.laps_for(pilot).into_iter().map(|l| (l.detection, l.id)).collect();
        let before: HashMap<DetectionId, u32> =
            race.detections_for(pilot).into_iter().map(|d| (d.id, d.lap_number)).collect();

        let mut order: Vec<usize> = race
            .detections()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.pilot == pilot)
            .map(|(index, _)| index)
            .collect();
        order.sort_by_key(|&index| race.detections().get(index).map(|d| d.time));

        let race_start = race
            .start()
            .or_else(|| order.first().and_then(|&i| race.detections().get(i)).map(|d| d.time))
            .unwrap_or_else(Utc::now);

        // Each restart displaces one more Auto detection, so this ends.
        let mut displaced = HashSet::new();
        let mut demoted = Vec::new();
        let laps = 'walk: loop {
            let mut progress = PilotProgress::default();
            let mut laps = Vec::new();
            let detections = race.detections_mut();
            for &index in &order {
                let Some(detection) = detections.get_mut(index) else {
                    continue;
                };
                let placement = progress.place(
                    detection,
                    first_lap,
                    self.config.min_lap_time,
                    race_start,
                    &displaced,
                );
                if let Some(holder) = placement.displaces {
                    displaced.insert(holder);
                    continue 'walk;
                }
                if placement.demoted {
                    demoted.push(detection.id);
                }
                if let Some(start) = placement.lap_start {
                    let mut lap = Lap::new(detection, start);
                    if let Some(&id) = existing.get(&detection.id) {
                        lap.id = id;
                    }
                    laps.push(lap);
                }
            }
            break laps;
        };

        let renumbered = race
            .detections_for(pilot)
            .into_iter()
            .filter(|d| before.get(&d.id).is_some_and(|&number| number != d.lap_number))
            .count();
        if !displaced.is_empty() || !demoted.is_empty() {
            debug!(
                race = %race.id,
                pilot = %pilot,
                displaced = displaced.len(),
                demoted = demoted.len(),
                "Manual overrides took race sectors"
            );
        }
        let removed_laps = race.replace_laps_for(pilot, laps);
        Rederived { pilot, removed_laps, renumbered, displaced: displaced.into_iter().collect(), demoted }
    }
}
