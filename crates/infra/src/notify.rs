//! Broadcast change notifications
//!
//! [`BroadcastChangeSink`] fans every published [`ChangeSet`] out to all
//! current subscribers over a `tokio::sync::broadcast` channel. Publishing
//! never blocks; a subscriber that falls behind by more than the channel
//! capacity sees `RecvError::Lagged` and skips the oldest change sets.

use calbridge_core::ChangeSink;
use calbridge_domain::ChangeSet;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default number of change sets buffered per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct BroadcastChangeSink {
    sender: broadcast::Sender<ChangeSet>,
}

impl Default for BroadcastChangeSink {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl BroadcastChangeSink {
    /// `capacity` is clamped to at least one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ChangeSink for BroadcastChangeSink {
    fn publish(&self, changes: &ChangeSet) {
        match self.sender.send(changes.clone()) {
            Ok(receivers) => trace!(receivers, changes = changes.len(), "change set published"),
            Err(_) => debug!(changes = changes.len(), "change set dropped, no subscribers"),
        }
    }
}
