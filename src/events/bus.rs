//! Event Bus Module
//!
//! Broadcasts accepted events to live subscribers (indexers, auditors).
//! The registry publishes while holding its write lock, so subscribers
//! receive events in log order.

use crate::{BatchEvent, EventKind};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Broadcast channel for accepted batch events
pub struct EventBus {
    sender: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BatchEvent) {
        trace!(sequence = event.sequence, "Publishing batch event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that writes every published event to the log
pub fn spawn_logging_listener(bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Audit listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping audit listener");
                    break;
                }
            }
        }
    })
}

fn log_event(event: &BatchEvent) {
    match &event.kind {
        EventKind::Registered { crop_type, origin_farm, .. } => {
            info!(
                sequence = event.sequence,
                batch_id = event.batch_id,
                crop_type = %crop_type,
                origin_farm = %origin_farm,
                "Batch registered"
            );
        }
        EventKind::OwnershipTransferred { new_owner } => {
            info!(
                sequence = event.sequence,
                batch_id = event.batch_id,
                new_owner = %new_owner,
                "Batch ownership transferred"
            );
        }
        EventKind::StatusUpdated { new_status } => {
            info!(
                sequence = event.sequence,
                batch_id = event.batch_id,
                new_status = %new_status,
                "Batch status updated"
            );
        }
    }
}
