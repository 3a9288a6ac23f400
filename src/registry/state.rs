//! Registry State
//!
//! The counter, record map and event log as one value. Every change goes
//! through `apply`, both for live mutations and for replaying a stored
//! log, so live state and replayed state are built by the same code.

use super::IdAllocator;
use crate::{events::EventLog, BatchEvent, BatchRecord, EventKind, RegistryError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    allocator: IdAllocator,
    records: BTreeMap<u64, BatchRecord>,
    log: EventLog,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state purely from an event log
    ///
    /// Fails with `Corrupt` if sequences are not `1..=n`, a registration
    /// skips or reuses an identifier, or a mutation targets an identifier
    /// that was never registered.
    pub fn replay(events: Vec<BatchEvent>) -> Result<Self, RegistryError> {
        let mut state = Self::new();
        for event in events {
            let sequence = event.sequence;
            state.apply(event).map_err(|e| match e {
                RegistryError::InvalidBatchId { batch_id, .. } => RegistryError::Corrupt(format!(
                    "event {sequence} targets unregistered batch {batch_id}"
                )),
                other => other,
            })?;
        }
        Ok(state)
    }

    /// The record `batch_id` would hold after `kind` is applied
    pub fn preview(&self, batch_id: u64, kind: &EventKind) -> Result<BatchRecord, RegistryError> {
        match kind {
            EventKind::Registered { crop_type, origin_farm, harvest_date } => {
                if batch_id != self.allocator.peek() {
                    return Err(RegistryError::Corrupt(format!(
                        "registration of batch {batch_id}, expected {}",
                        self.allocator.peek()
                    )));
                }
                Ok(BatchRecord::harvested(
                    batch_id,
                    crop_type.clone(),
                    origin_farm.clone(),
                    *harvest_date,
                ))
            }
            _ => {
                let mut record = self.records.get(&batch_id).cloned().ok_or(
                    RegistryError::InvalidBatchId { batch_id, counter: self.allocator.counter() },
                )?;
                record.apply(kind);
                Ok(record)
            }
        }
    }

    /// Apply one event: update the record, advance the counter on
    /// registration, append to the log
    pub fn apply(&mut self, event: BatchEvent) -> Result<(), RegistryError> {
        if event.sequence != self.log.next_sequence() {
            return Err(RegistryError::Corrupt(format!(
                "event sequence {}, expected {}",
                event.sequence,
                self.log.next_sequence()
            )));
        }

        let record = self.preview(event.batch_id, &event.kind)?;
        if let EventKind::Registered { .. } = event.kind {
            self.allocator.next_id();
        }
        self.records.insert(event.batch_id, record);
        self.log.append(event);
        Ok(())
    }

    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    pub fn counter(&self) -> u64 {
        self.allocator.counter()
    }

    pub fn record(&self, batch_id: u64) -> Option<&BatchRecord> {
        self.records.get(&batch_id)
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Whether the records equal `snapshot` exactly (same ids, same fields)
    pub fn matches(&self, snapshot: &[BatchRecord]) -> bool {
        self.records.len() == snapshot.len()
            && snapshot
                .iter()
                .all(|record| self.records.get(&record.batch_id) == Some(record))
    }

    pub fn records(&self) -> impl Iterator<Item = &BatchRecord> {
        self.records.values()
    }
}
