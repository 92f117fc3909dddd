//! Replay source for recorded detection logs

use std::collections::VecDeque;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use super::{RawDetection, TimingSource};
use crate::race::elapsed;
use crate::{RaceError, Result};

/// Replays a recorded list of raw detections.
///
/// Unpaced replays hand events over as fast as they are consumed. Paced
/// replays sleep for the recorded gap between events, divided by the speed.
pub struct ReplaySource {
    name: String,
    events: VecDeque<RawDetection>,
    paced: bool,
    /// Playback speed multiplier (1.0 = real time)
    speed: f64,
    last_time: Option<DateTime<Utc>>,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>, events: impl IntoIterator<Item = RawDetection>) -> Self {
        let events: VecDeque<RawDetection> = events.into_iter().collect();
        Self { name: name.into(), events, paced: false, speed: 1.0, last_time: None }
    }

    /// Parse a YAML list of raw detections.
    pub fn from_yaml(name: impl Into<String>, yaml: &str) -> Result<Self> {
        let events: Vec<RawDetection> = serde_yaml_ng::from_str(yaml)
            .map_err(|e| RaceError::config("Detection log", format!("YAML parsing failed: {e}")))?;
        Ok(Self::new(name, events))
    }

    /// Load a YAML detection log from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RaceError::file_error(path.to_path_buf(), e))?;
        let source = Self::from_yaml(path.display().to_string(), &yaml)?;
        info!("Loaded detection log {} ({} events)", path.display(), source.remaining());
        Ok(source)
    }

    /// Sleep between events according to their recorded timestamps.
    pub fn paced(mut self, speed: f64) -> Self {
        self.paced = true;
        self.set_speed(speed);
        self
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(0.1, 10.0);
        debug!("Replay speed set to {}x", self.speed);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

#[async_trait::async_trait]
impl TimingSource for ReplaySource {
    async fn next_event(&mut self) -> Result<Option<RawDetection>> {
        let Some(event) = self.events.pop_front() else {
            debug!(source = %self.name, "Reached end of replay");
            return Ok(None);
        };

        if self.paced
            && let Some(last) = self.last_time
        {
            let gap = elapsed(last, event.time).div_f64(self.speed);
            tokio::time::sleep(gap).await;
        }
        self.last_time = Some(event.time);

        trace!(source = %self.name, remaining = self.events.len(), "Replaying detection");
        Ok(Some(event))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, raw};
    use crate::types::ChannelId;

    #[tokio::test]
    async fn replays_every_event_then_ends() {
        let channel = ChannelId::new();
        let mut source =
            ReplaySource::new("log", vec![raw(channel, 0, at(1.0)), raw(channel, 0, at(5.0))]);
        assert_eq!(source.remaining(), 2);
        assert!(source.next_event().await.expect("ok").is_some());
        assert!(source.next_event().await.expect("ok").is_some());
        assert!(source.next_event().await.expect("ok").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn paced_replay_waits_for_recorded_gap() {
        let channel = ChannelId::new();
        let mut source =
            ReplaySource::new("log", vec![raw(channel, 0, at(1.0)), raw(channel, 0, at(5.0))])
                .paced(2.0);

        let started = tokio::time::Instant::now();
        source.next_event().await.expect("ok");
        source.next_event().await.expect("ok");
        assert!(started.elapsed() >= std::time::Duration::from_secs(2));
    }

    #[test]
    fn speed_is_clamped() {
        let mut source = ReplaySource::new("log", Vec::new());
        source.set_speed(100.0);
        assert!((source.speed() - 10.0).abs() < f64::EPSILON);
        source.set_speed(0.0);
        assert!((source.speed() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_yaml_logs() {
        let channel = ChannelId::new();
        let yaml = format!(
            "- timing_system_index: 0\n  channel: {channel}\n  peak: 140\n  time: 2024-05-01T10:00:01Z\n  is_lap_end: true\n"
        );
        let source = ReplaySource::from_yaml("log", &yaml).expect("parse");
        assert_eq!(source.remaining(), 1);
        assert!(ReplaySource::from_yaml("log", "not: [a list").is_err());
    }
}
