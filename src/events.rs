//! In-process publish/subscribe channel for sighting notifications.

use crate::structs::SightingRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    #[default]
    Cards,
    Map,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SightingEvent {
    /// A record was created outside the collection view, e.g. by a global drop zone.
    Created(SightingRecord),
    ViewModeChanged(ViewMode),
}

/// Cloneable handle to the sighting event channel.
///
/// Receivers must tolerate duplicate delivery of the same record.
#[derive(Clone)]
pub struct SightingEvents {
    tx: broadcast::Sender<SightingEvent>,
}

impl SightingEvents {
    /// # Arguments
    ///
    /// * `capacity` - Number of events buffered per subscriber before it starts lagging.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event, returning how many subscribers received it.
    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, event: SightingEvent) -> usize {
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!("Published sighting event to {} subscribers", delivered);
        delivered
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SightingEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SightingEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
