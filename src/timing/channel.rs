//! Push-style timing source backed by a bounded channel

use tokio::sync::mpsc;
use tracing::debug;

use super::{RawDetection, TimingSource};
use crate::{RaceError, Result};

/// Create a push handle and the source it feeds.
///
/// Hardware listeners keep the [`TimingEventSender`] on their own thread and
/// call [`TimingEventSender::blocking_send`] or [`TimingEventSender::send`];
/// the [`ChannelSource`] is attached to a [`crate::RaceDirector`]. The source
/// finishes once every sender has been dropped.
pub fn channel_source(name: impl Into<String>, capacity: usize) -> (TimingEventSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TimingEventSender { tx }, ChannelSource { name: name.into(), rx })
}

/// Cloneable push handle for a hardware listener.
#[derive(Debug, Clone)]
pub struct TimingEventSender {
    tx: mpsc::Sender<RawDetection>,
}

impl TimingEventSender {
    /// Queue an event, waiting while the queue is full.
    pub async fn send(&self, event: RawDetection) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| RaceError::source_failed("timing source was dropped"))
    }

    /// Queue an event from a non-async listener thread.
    pub fn blocking_send(&self, event: RawDetection) -> Result<()> {
        self.tx
            .blocking_send(event)
            .map_err(|_| RaceError::source_failed("timing source was dropped"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, attached to the director.
#[derive(Debug)]
pub struct ChannelSource {
    name: String,
    rx: mpsc::Receiver<RawDetection>,
}

#[async_trait::async_trait]
impl TimingSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<RawDetection>> {
        let event = self.rx.recv().await;
        if event.is_none() {
            debug!(source = %self.name, "All senders dropped");
        }
        Ok(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
