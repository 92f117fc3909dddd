//! Test utilities shared by unit tests, integration tests and benches
//!
//! Every timestamp is expressed in seconds from a fixed reference instant so
//! tests read like a race sheet: `detection_at(pilot, 12.5)`.

#![cfg(any(test, feature = "benchmark"))]

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::EventConfig;
use crate::detection::Detection;
use crate::race::{Race, Split, elapsed};
use crate::timing::RawDetection;
use crate::types::{
    Channel, ChannelId, DetectionId, PilotId, RoundId, Sector, TimingSystemIndex, TimingSystemType,
};

/// Reference instant all fixture times are relative to (2024-05-01T10:00:00Z).
const REFERENCE_TIMESTAMP: i64 = 1_714_557_600;

/// Peak reported by fixture detections, comfortably above usual thresholds.
pub const FIXTURE_PEAK: i32 = 140;

/// Instant `secs` seconds after the reference, to the millisecond.
pub fn at(secs: f64) -> DateTime<Utc> {
    let base = DateTime::from_timestamp(REFERENCE_TIMESTAMP, 0).expect("valid reference timestamp");
    base + TimeDelta::milliseconds((secs * 1000.0).round() as i64)
}

/// The eight RaceBand channels, with fresh ids.
pub fn raceband() -> Vec<Channel> {
    Channel::raceband()
}

pub fn pilots(count: usize) -> Vec<PilotId> {
    (0..count).map(|_| PilotId::new()).collect()
}

/// Raw event from a timing point; index 0 closes the lap.
pub fn raw(channel: ChannelId, timing_system_index: TimingSystemIndex, time: DateTime<Utc>) -> RawDetection {
    RawDetection {
        timing_system_type: TimingSystemType::default(),
        timing_system_index,
        channel,
        peak: FIXTURE_PEAK,
        time,
        is_lap_end: timing_system_index == 0,
    }
}

/// Lap-end detection at timing point 0.
pub fn detection_at(pilot: PilotId, secs: f64) -> Detection {
    Detection::new(
        TimingSystemType::default(),
        0,
        pilot,
        ChannelId::new(),
        at(secs),
        0,
        true,
        FIXTURE_PEAK,
    )
}

/// Mid-lap detection at a split timing point.
pub fn split_detection_at(pilot: PilotId, timing_system_index: TimingSystemIndex, secs: f64) -> Detection {
    Detection::new(
        TimingSystemType::default(),
        timing_system_index,
        pilot,
        ChannelId::new(),
        at(secs),
        0,
        false,
        FIXTURE_PEAK,
    )
}

/// A race started at `at(0.0)` with `count` pilots on RaceBand.
pub fn running_race(count: usize) -> (Race, Vec<PilotId>) {
    let mut race = Race::new(RoundId::new(), 1);
    let pilots = pilots(count);
    for (pilot, channel) in pilots.iter().zip(raceband()) {
        race.set_pilot(&channel, *pilot).expect("free channel");
    }
    race.start_at(at(0.0)).expect("start race");
    (race, pilots)
}

/// Split of `secs` seconds from the reference instant, ending at a timing point.
pub fn split(pilot: PilotId, timing_system_index: TimingSystemIndex, secs: f64) -> Split {
    let (start, end) = (at(0.0), at(secs));
    Split {
        pilot,
        detection: DetectionId::new(),
        timing_system_index,
        lap_number: 1,
        start,
        end,
        time: elapsed(start, end),
    }
}

/// Event with one sector per length, timed by points `0..lengths.len()`.
pub fn event_config(lengths: &[f32]) -> EventConfig {
    EventConfig {
        name: "Test event".to_string(),
        sectors: lengths.iter().map(|&length| Sector::new(length)).collect(),
        ..EventConfig::default()
    }
}
