use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status every batch starts in when it is registered
pub const HARVESTED: &str = "Harvested";

/// One tracked unit of crop
///
/// `batch_id`, `crop_type`, `origin_farm` and `harvest_date` are fixed at
/// registration. Only `current_owner` and `status` change afterwards.
///
/// `Default` yields the all-empty record returned for unknown identifiers
/// when the registry runs with `unknown_batch_query = "default_record"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_id: u64,
    pub crop_type: String,
    pub origin_farm: String,
    /// Unix timestamp (seconds); negative for dates before 1970
    pub harvest_date: i64,
    pub current_owner: String,
    pub status: String,
}

impl BatchRecord {
    /// Fresh record for a newly registered batch: owned by its farm, `Harvested`
    pub fn harvested(batch_id: u64, crop_type: String, origin_farm: String, harvest_date: i64) -> Self {
        Self {
            batch_id,
            current_owner: origin_farm.clone(),
            crop_type,
            origin_farm,
            harvest_date,
            status: HARVESTED.to_string(),
        }
    }

    /// Apply an event's effect to this record
    ///
    /// Registration events are handled by the caller since they create the
    /// record rather than modify it.
    pub fn apply(&mut self, kind: &EventKind) {
        match kind {
            EventKind::Registered { .. } => {}
            EventKind::OwnershipTransferred { new_owner } => {
                self.current_owner = new_owner.clone();
            }
            EventKind::StatusUpdated { new_status } => {
                self.status = new_status.clone();
            }
        }
    }
}

/// Kind-specific payload of an accepted mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum EventKind {
    Registered {
        crop_type: String,
        origin_farm: String,
        harvest_date: i64,
    },
    OwnershipTransferred {
        new_owner: String,
    },
    StatusUpdated {
        new_status: String,
    },
}

impl EventKind {
    /// Tag stored alongside the payload in the database
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Registered { .. } => "Registered",
            EventKind::OwnershipTransferred { .. } => "OwnershipTransferred",
            EventKind::StatusUpdated { .. } => "StatusUpdated",
        }
    }
}

/// Immutable fact describing one accepted mutation
///
/// `sequence` is the 1-based position in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEvent {
    pub sequence: u64,
    pub batch_id: u64,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Unix timestamp (seconds) at which the registry accepted the mutation
    pub recorded_at: i64,
}

/// Result of replaying the event log against the live records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub batches: u64,
    pub events: u64,
    pub consistent: bool,
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid batch id {batch_id}: valid ids are 1..={counter}")]
    InvalidBatchId { batch_id: u64, counter: u64 },

    #[error("Batch not found: {0}")]
    NotFound(u64),

    #[error("Mutation rejected: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event log is corrupt: {0}")]
    Corrupt(String),

    #[error("Value out of storable range: {0}")]
    OutOfRange(String),

    #[error("Mutation task failed: {0}")]
    Internal(String),
}
