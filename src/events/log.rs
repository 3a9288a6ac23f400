//! Event Log Module
//!
//! Append-only, totally ordered record of every accepted mutation.
//! Events are never modified or removed once appended; the only write
//! operation is `append`, which assigns the next sequence number.

use crate::{BatchEvent, EventKind};

/// In-memory event log
///
/// Event `n` (1-based sequence) lives at index `n - 1`.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<BatchEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the event that `append` would store next, without storing it
    pub fn stage(&self, batch_id: u64, kind: EventKind) -> BatchEvent {
        BatchEvent {
            sequence: self.next_sequence(),
            batch_id,
            kind,
            recorded_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Append a staged event
    ///
    /// The event's sequence must be the next one in the log.
    pub fn append(&mut self, event: BatchEvent) {
        debug_assert_eq!(event.sequence, self.next_sequence());
        self.events.push(event);
    }

    pub fn next_sequence(&self) -> u64 {
        self.events.len() as u64 + 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn all(&self) -> &[BatchEvent] {
        &self.events
    }

    /// Up to `limit` events starting at sequence `from_sequence`
    pub fn page(&self, from_sequence: u64, limit: usize) -> Vec<BatchEvent> {
        let start = from_sequence.saturating_sub(1) as usize;
        self.events.iter().skip(start).take(limit).cloned().collect()
    }

    /// Every event that touched `batch_id`, in log order
    pub fn for_batch(&self, batch_id: u64) -> Vec<BatchEvent> {
        self.events
            .iter()
            .filter(|event| event.batch_id == batch_id)
            .cloned()
            .collect()
    }
}
