//! Speed records from per-sector distances.
//!
//! Each timing point closes a flight-path sector of known length, so a split
//! ending at that point gives an average speed over the sector. The tracker
//! keeps every pilot's best speed and the event-wide best, and publishes what
//! it computes on a broadcast channel it owns.
//!
//! ```text
//! Uninitialized ──initialize──► Ready       (some sector has a length)
//!                         └──► NoDistance  (no sector has a length)
//! ```
//!
//! `initialize` can be called again whenever the flight path changes.
//! Records are transient: they are always rebuildable from race splits.

use std::collections::HashMap;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::race::Split;
use crate::types::{PilotId, Sector, TimingSystemIndex};

/// Anything faster is a sensor artifact (m/s).
pub const MAX_VALID_SPEED: f32 = 200.0;

const EVENT_CAPACITY: usize = 256;

/// Whether speeds can be computed for the current flight path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    Uninitialized,
    Ready,
    NoDistance,
}

/// Notifications published by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeedEvent {
    /// A split produced a plausible speed
    Calculated { split: Split, speed: f32 },
    /// The pilot beat their own best
    NewPersonalBest { split: Split, speed: f32 },
    /// The pilot beat the best speed of the event
    NewOverallBest { split: Split, speed: f32 },
    /// The pilot's record was rebuilt from scratch and may have gone down
    PilotRecomputed { pilot: PilotId, speed: Option<f32> },
}

/// Best speed of one pilot.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedRecord {
    pub pilot: PilotId,
    /// Metres per second
    pub speed: f32,
    pub split: Split,
}

/// A pilot's best speed as seen by presentation code.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSpeed {
    pub split: Split,
    pub speed: f32,
    /// The pilot holds the best speed of the event
    pub overall_best: bool,
}

/// Keeps per-pilot and event-wide best speeds.
#[derive(Debug)]
pub struct SpeedRecordTracker {
    state: TrackerState,
    distances: HashMap<TimingSystemIndex, f32>,
    records: HashMap<PilotId, SpeedRecord>,
    max_speed: f32,
    events: broadcast::Sender<SpeedEvent>,
}

impl Default for SpeedRecordTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedRecordTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: TrackerState::Uninitialized,
            distances: HashMap::new(),
            records: HashMap::new(),
            max_speed: 0.0,
            events,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn has_distance(&self) -> bool {
        self.state == TrackerState::Ready
    }

    /// Subscribe to speed notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SpeedEvent> {
        self.events.subscribe()
    }

    /// Speed notifications as a stream. Lagged notifications are skipped.
    pub fn events(&self) -> impl Stream<Item = SpeedEvent> + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move { event.ok() })
    }

    /// Map timing points (in sector order) to flight-path sector lengths, then
    /// rebuild every record from `splits`.
    pub fn initialize(
        &mut self,
        timing_systems: &[TimingSystemIndex],
        sectors: &[Sector],
        splits: impl IntoIterator<Item = Split>,
    ) {
        self.distances = timing_systems
            .iter()
            .zip(sectors.iter())
            .map(|(&index, sector)| (index, sector.length))
            .collect();

        self.state = if self.distances.values().any(|&length| length > 0.0) {
            TrackerState::Ready
        } else {
            TrackerState::NoDistance
        };
        info!(
            timing_points = self.distances.len(),
            state = ?self.state,
            "Speed tracker initialised"
        );

        self.update(splits);
    }

    /// Length of the sector closed by a timing point.
    pub fn distance(&self, index: TimingSystemIndex) -> Option<f32> {
        self.distances.get(&index).copied()
    }

    /// Speed over the split's sector, before outlier rejection.
    fn raw_speed(&self, split: &Split) -> Option<f32> {
        if !self.has_distance() || split.time.is_zero() {
            return None;
        }
        let distance = self.distance(split.timing_system_index).filter(|&d| d > 0.0)?;
        Some((f64::from(distance) / split.time.as_secs_f64()) as f32)
    }

    /// Plausible speed of a split in m/s, 0 when unknown or implausible.
    pub fn speed(&self, split: &Split) -> f32 {
        match self.raw_speed(split) {
            Some(speed) if speed <= MAX_VALID_SPEED => speed,
            _ => 0.0,
        }
    }

    pub fn speeds<'a>(&self, splits: impl IntoIterator<Item = &'a Split>) -> Vec<f32> {
        splits.into_iter().map(|split| self.speed(split)).collect()
    }

    /// Compute the split's speed and update records. Returns the speed when
    /// it was plausible.
    pub fn check_split(&mut self, split: &Split) -> Option<f32> {
        self.consider(split, true)
    }

    fn consider(&mut self, split: &Split, notify: bool) -> Option<f32> {
        let speed = self.raw_speed(split)?;
        if speed > MAX_VALID_SPEED {
            warn!(pilot = %split.pilot, speed, "Speed over max limit: {} m/s", speed);
            return None;
        }

        if notify {
            self.publish(SpeedEvent::Calculated { split: split.clone(), speed });
        }

        let best = self.records.get(&split.pilot).map_or(0.0, |r| r.speed);
        if speed > best {
            self.records.insert(
                split.pilot,
                SpeedRecord { pilot: split.pilot, speed, split: split.clone() },
            );
            if notify {
                self.publish(SpeedEvent::NewPersonalBest { split: split.clone(), speed });
            }
            if speed > self.max_speed {
                self.max_speed = speed;
                if notify {
                    self.publish(SpeedEvent::NewOverallBest { split: split.clone(), speed });
                }
            }
        }
        Some(speed)
    }

    fn publish(&self, event: SpeedEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Rebuild every record from scratch without notifications.
    pub fn update(&mut self, splits: impl IntoIterator<Item = Split>) {
        self.records.clear();
        self.max_speed = 0.0;
        if !self.has_distance() {
            return;
        }
        for split in splits {
            self.consider(&split, false);
        }
        debug!(pilots = self.records.len(), max_speed = self.max_speed, "Speed records rebuilt");
    }

    /// Discard the pilot's record and rebuild it from their splits in every
    /// started race, then recompute the event best.
    pub fn update_pilot(&mut self, pilot: PilotId, splits: impl IntoIterator<Item = Split>) {
        if !self.has_distance() {
            return;
        }
        self.records.remove(&pilot);
        self.max_speed = self.records.values().map(|r| r.speed).fold(0.0, f32::max);

        for split in splits.into_iter().filter(|s| s.pilot == pilot) {
            self.consider(&split, false);
        }
        self.max_speed = self.records.values().map(|r| r.speed).fold(0.0, f32::max);

        let speed = self.records.get(&pilot).map(|r| r.speed);
        debug!(pilot = %pilot, ?speed, "Pilot speed record recomputed");
        self.publish(SpeedEvent::PilotRecomputed { pilot, speed });
    }

    pub fn record(&self, pilot: PilotId) -> Option<&SpeedRecord> {
        if !self.has_distance() {
            return None;
        }
        self.records.get(&pilot)
    }

    pub fn best_speed(&self, pilot: PilotId) -> Option<BestSpeed> {
        self.record(pilot).map(|record| BestSpeed {
            split: record.split.clone(),
            speed: record.speed,
            overall_best: (self.max_speed - record.speed).abs() < f32::EPSILON,
        })
    }

    /// Event-wide best speed in m/s.
    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::split;

    fn tracker(lengths: &[f32]) -> SpeedRecordTracker {
        let indices: Vec<TimingSystemIndex> = (0..lengths.len() as u32).collect();
        let sectors: Vec<Sector> = lengths.iter().map(|&l| Sector::new(l)).collect();
        let mut tracker = SpeedRecordTracker::new();
        tracker.initialize(&indices, &sectors, Vec::new());
        tracker
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn computes_speed_from_sector_length() {
        let mut tracker = tracker(&[100.0]);
        let pilot = PilotId::new();

        let speeds: Vec<Option<f32>> =
            [10.0, 8.0, 50.0].iter().map(|&t| tracker.check_split(&split(pilot, 0, t))).collect();
        assert!(close(speeds[0].expect("speed"), 10.0));
        assert!(close(speeds[1].expect("speed"), 12.5));
        assert!(close(speeds[2].expect("speed"), 2.0));

        let best = tracker.best_speed(pilot).expect("record");
        assert!(close(best.speed, 12.5));
        assert!(best.overall_best);
    }

    #[test]
    fn outliers_are_rejected_without_side_effects() {
        let mut tracker = tracker(&[100.0]);
        let mut events = tracker.subscribe();
        let pilot = PilotId::new();

        assert_eq!(tracker.check_split(&split(pilot, 0, 0.1)), None);
        assert!(tracker.best_speed(pilot).is_none());
        assert!(close(tracker.max_speed(), 0.0));
        assert!(events.try_recv().is_err());
        assert!(close(tracker.speed(&split(pilot, 0, 0.1)), 0.0));
    }

    #[test]
    fn zero_time_and_unknown_sectors_are_ignored() {
        let mut tracker = tracker(&[0.0, 50.0]);
        let pilot = PilotId::new();
        assert_eq!(tracker.state(), TrackerState::Ready);

        assert_eq!(tracker.check_split(&split(pilot, 1, 0.0)), None);
        assert_eq!(tracker.check_split(&split(pilot, 0, 5.0)), None);
        assert_eq!(tracker.check_split(&split(pilot, 7, 5.0)), None);
        assert!(close(tracker.check_split(&split(pilot, 1, 5.0)).expect("speed"), 10.0));
    }

    #[test]
    fn no_distance_disables_tracking() {
        let mut tracker = tracker(&[0.0, 0.0]);
        assert_eq!(tracker.state(), TrackerState::NoDistance);
        let pilot = PilotId::new();
        assert_eq!(tracker.check_split(&split(pilot, 0, 5.0)), None);
        assert!(tracker.best_speed(pilot).is_none());

        let uninitialised = SpeedRecordTracker::new();
        assert_eq!(uninitialised.state(), TrackerState::Uninitialized);
        assert!(close(uninitialised.speed(&split(pilot, 0, 5.0)), 0.0));
    }

    #[test]
    fn notifications_follow_records() {
        let mut tracker = tracker(&[100.0]);
        let mut events = tracker.subscribe();
        let (a, b) = (PilotId::new(), PilotId::new());

        tracker.check_split(&split(a, 0, 10.0));
        tracker.check_split(&split(b, 0, 20.0));
        tracker.check_split(&split(a, 0, 50.0));

        let received: Vec<SpeedEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        let kinds: Vec<&str> = received
            .iter()
            .map(|e| match e {
                SpeedEvent::Calculated { .. } => "calculated",
                SpeedEvent::NewPersonalBest { .. } => "personal",
                SpeedEvent::NewOverallBest { .. } => "overall",
                SpeedEvent::PilotRecomputed { .. } => "recomputed",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["calculated", "personal", "overall", "calculated", "personal", "calculated"]
        );

        assert!(tracker.best_speed(a).expect("a").overall_best);
        assert!(!tracker.best_speed(b).expect("b").overall_best);
    }

    #[test]
    fn update_pilot_can_lower_a_record() {
        let mut tracker = tracker(&[100.0]);
        let (a, b) = (PilotId::new(), PilotId::new());
        let fast = split(a, 0, 5.0);
        tracker.check_split(&fast);
        tracker.check_split(&split(a, 0, 10.0));
        tracker.check_split(&split(b, 0, 8.0));
        assert!(close(tracker.max_speed(), 20.0));

        let mut events = tracker.subscribe();
        let remaining = vec![split(a, 0, 10.0), split(b, 0, 8.0)];
        tracker.update_pilot(a, remaining);

        assert!(close(tracker.best_speed(a).expect("a").speed, 10.0));
        assert!(close(tracker.max_speed(), 12.5));
        assert!(tracker.best_speed(b).expect("b").overall_best);
        assert!(matches!(
            events.try_recv(),
            Ok(SpeedEvent::PilotRecomputed { pilot, speed: Some(_) }) if pilot == a
        ));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn reinitialising_rebuilds_records() {
        let mut tracker = tracker(&[100.0]);
        let pilot = PilotId::new();
        let splits = vec![split(pilot, 0, 10.0)];
        tracker.check_split(&splits[0]);

        tracker.initialize(&[0], &[Sector::new(200.0)], splits.clone());
        assert!(close(tracker.best_speed(pilot).expect("record").speed, 20.0));

        tracker.initialize(&[0], &[Sector::new(0.0)], splits);
        assert_eq!(tracker.state(), TrackerState::NoDistance);
        assert!(tracker.best_speed(pilot).is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn personal_best_never_decreases(times in prop::collection::vec(0.0f64..60.0, 1..50)) {
                let mut tracker = tracker(&[100.0]);
                let pilot = PilotId::new();
                let mut events = tracker.subscribe();
                let mut last_best = 0.0f32;

                for t in times {
                    tracker.check_split(&split(pilot, 0, t));
                    if let Some(best) = tracker.best_speed(pilot) {
                        prop_assert!(best.speed >= last_best);
                        prop_assert!(best.speed <= MAX_VALID_SPEED);
                        last_best = best.speed;
                    }
                }

                let mut reported = 0.0f32;
                while let Ok(event) = events.try_recv() {
                    if let SpeedEvent::NewPersonalBest { speed, .. } = event {
                        prop_assert!(speed > reported);
                        reported = speed;
                    }
                }
            }
        }
    }
}
