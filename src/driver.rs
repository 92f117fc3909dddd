//! Driver spawns and manages timing source tasks

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::director::{RaceDirector, RaceEvent};
use crate::timing::TimingSource;
use crate::{RaceError, Result};

const MAX_ERRORS: u32 = 10;

/// Counters reported when a source task ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub name: String,
    /// Detections applied to a race
    pub accepted: u64,
    /// Events the pipeline refused (unassigned channel, weak signal, ...)
    pub dropped: u64,
    /// The source gave up after repeated errors
    pub failed: bool,
}

/// Handle to one attached timing source.
#[derive(Debug)]
pub struct SourceHandle {
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<SourceSummary>,
}

impl SourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop reading from the source. Events already read are applied.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the source task to end.
    pub async fn join(self) -> Result<SourceSummary> {
        self.task
            .await
            .map_err(|e| RaceError::source_failed_with(format!("{} task panicked", self.name), Box::new(e)))
    }
}

/// Driver spawns one reader task per timing source
///
/// The task owns the source and feeds every event to the director. Transient
/// source errors are retried with exponential backoff.
pub(crate) struct Driver;

impl Driver {
    pub(crate) fn spawn<S>(source: S, director: RaceDirector, cancel: CancellationToken) -> SourceHandle
    where
        S: TimingSource,
    {
        let name = source.name().to_string();
        let cancel_reader = cancel.clone();
        let task = tokio::spawn(async move { Self::reader_task(source, director, cancel_reader).await });
        SourceHandle { name, cancel, task }
    }

    async fn reader_task<S>(mut source: S, director: RaceDirector, cancel: CancellationToken) -> SourceSummary
    where
        S: TimingSource,
    {
        let mut summary = SourceSummary { name: source.name().to_string(), ..Default::default() };
        let mut error_count = 0u32;
        info!(source = %summary.name, "Timing source started");

        loop {
            // Allow cancellation while waiting on hardware
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = %summary.name, "Timing source cancelled");
                    break;
                }
                result = source.next_event() => result,
            };

            match result {
                Ok(Some(raw)) => {
                    error_count = 0;
                    trace!(
                        source = %summary.name,
                        index = raw.timing_system_index,
                        channel = %raw.channel,
                        "Raw detection"
                    );
                    match director.ingest(raw) {
                        Ok(_) => summary.accepted += 1,
                        Err(e) => {
                            summary.dropped += 1;
                            match e {
                                RaceError::UnassignedChannel { .. }
                                | RaceError::WeakSignal { .. }
                                | RaceError::NoCurrentRace
                                | RaceError::RaceNotRunning { .. } => {
                                    debug!(source = %summary.name, "Detection dropped: {}", e);
                                }
                                _ => warn!(source = %summary.name, "Detection dropped: {}", e),
                            }
                        }
                    }
                }
                Ok(None) => {
                    info!(source = %summary.name, "Timing source ended after {} detections", summary.accepted);
                    director.publish(RaceEvent::SourceFinished { source: summary.name.clone() });
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!(source = %summary.name, "Timing source error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS || !e.is_retryable() {
                        error!(source = %summary.name, "Giving up on timing source");
                        summary.failed = true;
                        director.publish(RaceEvent::SourceFailed {
                            source: summary.name.clone(),
                            reason: e.to_string(),
                        });
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        summary
    }
}
