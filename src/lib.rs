//! Live drone race timing and round scheduling.
//!
//! Holeshot turns noisy crossings reported by timing hardware into validated
//! laps, sector splits and speed records, and seeds pilots into the races of
//! the next round without radio-frequency conflicts.
//!
//! # Pipeline
//!
//! ```text
//! TimingSource ─► DetectionValidator ─► LapAssembler ─► SpeedRecordTracker
//!                                            ▲
//!             RoundFormat (next round) ──────┘
//! ```
//!
//! - **Timing sources** deliver decoded crossings, one task per source
//! - **Validation** binds a crossing to the pilot flying its channel
//! - **Assembly** numbers laps, forms splits and rejects duplicates
//! - **Speed tracking** keeps personal and event-wide best speeds
//! - **Round formats** turn a finished round into the next round's races
//!
//! [`RaceDirector`] ties these together with per-race locking, snapshot
//! streams and event fan-out.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use holeshot::timing::ReplaySource;
//! use holeshot::types::PilotId;
//! use holeshot::{EventConfig, RaceDirector, RoundPlan, RoundType, TopFormat, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> holeshot::Result<()> {
//!     let config = EventConfig::load("event.yaml")?;
//!     let director = RaceDirector::new(&config);
//!
//!     let plan = RoundPlan {
//!         pilots: (0..4).map(|_| PilotId::new()).collect(),
//!         channels: config.channels(),
//!         number_of_races: 1,
//!         calling_round: None,
//!         target_laps: 3,
//!     };
//!     let round = director.generate_round(&TopFormat, RoundType::Round, &plan)?;
//!     let race = round.races[0].id;
//!     director.set_current_race(race)?;
//!     director.start_race(race, chrono::Utc::now())?;
//!
//!     let source = director.attach(ReplaySource::load("detections.yaml")?.paced(1.0));
//!     let mut updates = director.race_updates(race, UpdateRate::Max(10))?;
//!     while let Some(snapshot) = updates.next().await {
//!         println!("{} laps", snapshot.laps().len());
//!     }
//!     source.join().await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Race model
pub mod detection;
pub mod race;

// Pipeline
pub mod assembler;
pub mod config;
pub mod director;
pub mod driver;
pub mod format;
pub mod speed;
pub mod stream;
pub mod timing;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use assembler::{AssemblerConfig, LapAssembler, OrderingPolicy};
pub use config::EventConfig;
pub use detection::{Detection, ValidityType};
pub use director::{RaceDirector, RaceEvent};
pub use driver::{SourceHandle, SourceSummary};
pub use format::{GeneratedRound, RoundFormat, RoundPlan, TopFormat};
pub use race::{Lap, PrimaryTimingSystemLocation, Race, RaceState, Round, RoundType, Split};
pub use speed::{BestSpeed, SpeedEvent, SpeedRecordTracker};
pub use timing::{DetectionValidator, RawDetection, TimingSource};

/// Unified entry point for an event.
///
/// # Examples
///
/// ```rust,no_run
/// use holeshot::Holeshot;
///
/// # fn main() -> holeshot::Result<()> {
/// let director = Holeshot::open("event.yaml")?;
/// # Ok(())
/// # }
/// ```
pub struct Holeshot;

impl Holeshot {
    /// Load an event file and create its director.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist or is not readable
    /// - The YAML is malformed
    /// - Channels share a frequency or a sector length is negative
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<RaceDirector> {
        let config = EventConfig::load(path)?;
        Ok(RaceDirector::new(&config))
    }

    /// Create a director from an event description held in memory.
    pub fn from_yaml(yaml: &str) -> Result<RaceDirector> {
        let config = EventConfig::from_yaml(yaml)?;
        Ok(RaceDirector::new(&config))
    }
}
