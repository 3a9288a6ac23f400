//! Batch Registry
//!
//! Owns the registry state and serializes every mutation through a single
//! write lock. A mutation is validated, durably committed, applied in
//! memory and published to the event bus while that lock is held, so no
//! caller ever observes a half-applied change and events are published
//! in log order. Queries share a read lock.
//!
//! Each mutation runs to completion on its own spawned task. The caller
//! only awaits the result, so dropping the caller (a client disconnect)
//! cannot stop a mutation between its durable commit and its in-memory
//! apply.

use super::{Database, RegistryState};
use crate::{
    config::{RegistryConfig, UnknownBatchQuery},
    events::EventBus,
    validation::{check_batch_id, Mutation, MutationGate, Validator},
    AuditReport, BatchEvent, BatchRecord, EventKind, RegistryError,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Largest page `events` will return
pub const MAX_EVENT_PAGE: usize = 1000;

pub struct BatchRegistry {
    writer: Writer,
    unknown_batch_query: UnknownBatchQuery,
}

/// Everything a mutation task needs, cheap to clone into the task
#[derive(Clone)]
struct Writer {
    state: Arc<RwLock<RegistryState>>,
    /// `None` keeps everything in memory
    database: Option<Database>,
    validator: Arc<Validator>,
    bus: Arc<EventBus>,
}

impl BatchRegistry {
    /// Creates an empty registry with no durable storage
    pub fn new(config: &RegistryConfig) -> Self {
        Self::with_state(RegistryState::new(), None, config)
    }

    /// Opens a registry over a database, rebuilding state from its event log
    ///
    /// The replayed records must equal the stored `batches` table exactly,
    /// otherwise the log has been tampered with and opening fails.
    pub async fn open(database: Database, config: &RegistryConfig) -> Result<Self, RegistryError> {
        let events = database.load_events().await?;
        let state = RegistryState::replay(events)?;

        let stored = database.load_batches().await?;
        if !state.matches(&stored) {
            return Err(RegistryError::Corrupt(format!(
                "stored batches ({}) disagree with event log replay ({} batches, {} events)",
                stored.len(),
                state.counter(),
                state.log().len()
            )));
        }

        info!(
            batches = state.counter(),
            events = state.log().len(),
            "Registry restored from database"
        );

        Ok(Self::with_state(state, Some(database), config))
    }

    fn with_state(state: RegistryState, database: Option<Database>, config: &RegistryConfig) -> Self {
        Self {
            writer: Writer {
                state: Arc::new(RwLock::new(state)),
                database,
                validator: Arc::new(Validator::default()),
                bus: Arc::new(EventBus::with_capacity(config.event_buffer)),
            },
            unknown_batch_query: config.unknown_batch_query,
        }
    }

    /// Route every mutation through `gate` before it is accepted
    pub fn with_gate(mut self, gate: Arc<dyn MutationGate>) -> Self {
        self.writer.validator = Arc::new(Validator::new(gate));
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.writer.bus.clone()
    }

    /// Register a new batch and return its identifier
    ///
    /// The batch starts owned by `origin_farm` with status `Harvested`.
    pub async fn register_batch(
        &self,
        crop_type: String,
        origin_farm: String,
        harvest_date: i64,
    ) -> Result<u64, RegistryError> {
        let kind = EventKind::Registered { crop_type, origin_farm, harvest_date };
        let batch_id = self.submit(None, kind).await?;

        info!(batch_id, "Batch registered");
        Ok(batch_id)
    }

    /// Hand a batch to `new_owner`
    pub async fn transfer_ownership(&self, batch_id: u64, new_owner: String) -> Result<(), RegistryError> {
        self.submit(Some(batch_id), EventKind::OwnershipTransferred { new_owner })
            .await?;

        info!(batch_id, "Batch ownership transferred");
        Ok(())
    }

    /// Set a batch's status; any string may follow any other
    pub async fn update_status(&self, batch_id: u64, new_status: String) -> Result<(), RegistryError> {
        self.submit(Some(batch_id), EventKind::StatusUpdated { new_status })
            .await?;

        info!(batch_id, "Batch status updated");
        Ok(())
    }

    /// Snapshot of a batch's current record
    ///
    /// For an identifier outside `1..=counter` this fails with `NotFound`,
    /// or returns `BatchRecord::default()` when configured with
    /// `UnknownBatchQuery::DefaultRecord`.
    pub async fn get_batch_details(&self, batch_id: u64) -> Result<BatchRecord, RegistryError> {
        let state = self.writer.state.read().await;
        debug!(batch_id, "Querying batch details");

        match state.record(batch_id) {
            Some(record) => Ok(record.clone()),
            None => match self.unknown_batch_query {
                UnknownBatchQuery::NotFound => Err(RegistryError::NotFound(batch_id)),
                UnknownBatchQuery::DefaultRecord => Ok(BatchRecord::default()),
            },
        }
    }

    /// Every event recorded for one batch, oldest first
    pub async fn get_batch_history(&self, batch_id: u64) -> Result<Vec<BatchEvent>, RegistryError> {
        let state = self.writer.state.read().await;
        debug!(batch_id, "Querying batch history");

        check_batch_id(state.allocator(), batch_id)?;
        Ok(state.log().for_batch(batch_id))
    }

    /// A page of the global event log starting at `from_sequence`
    pub async fn events(&self, from_sequence: u64, limit: usize) -> Vec<BatchEvent> {
        let state = self.writer.state.read().await;
        state.log().page(from_sequence, limit.min(MAX_EVENT_PAGE))
    }

    /// Number of registered batches
    pub async fn batch_count(&self) -> u64 {
        self.writer.state.read().await.counter()
    }

    /// Number of events in the log
    pub async fn event_count(&self) -> usize {
        self.writer.state.read().await.log().len()
    }

    /// Replay the live event log and compare the result with the live records
    pub async fn audit(&self) -> Result<AuditReport, RegistryError> {
        let state = self.writer.state.read().await;
        let replayed = RegistryState::replay(state.log().all().to_vec())?;
        let live: Vec<BatchRecord> = state.records().cloned().collect();
        let consistent = replayed.counter() == state.counter() && replayed.matches(&live);

        if !consistent {
            warn!("Event log replay disagrees with live records");
        }

        Ok(AuditReport {
            batches: state.counter(),
            events: state.log().len() as u64,
            consistent,
        })
    }

    /// Close durable storage
    pub async fn close(&self) {
        if let Some(database) = &self.writer.database {
            database.close().await;
        }
    }

    /// Run one mutation on its own task and wait for the outcome
    ///
    /// `target` is `None` for registration, which targets the next
    /// identifier. Returns the identifier the mutation was recorded against.
    async fn submit(&self, target: Option<u64>, kind: EventKind) -> Result<u64, RegistryError> {
        let writer = self.writer.clone();
        let task = tokio::spawn(async move { writer.apply(target, kind).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(RegistryError::Internal(e.to_string())),
        }
    }
}

impl Writer {
    /// Validate, commit, apply and publish one mutation under the write lock
    ///
    /// Nothing changes in memory unless the durable commit succeeded.
    async fn apply(&self, target: Option<u64>, kind: EventKind) -> Result<u64, RegistryError> {
        let mut state = self.state.clone().write_owned().await;
        let batch_id = target.unwrap_or_else(|| state.allocator().peek());

        self.validator
            .validate(state.allocator(), &Mutation::for_event(batch_id, &kind))?;

        let record = state.preview(batch_id, &kind)?;
        let event = state.log().stage(batch_id, kind);

        if let Some(database) = &self.database {
            database.commit(&record, &event).await?;
        }

        state.apply(event.clone())?;
        self.bus.publish(event);
        Ok(batch_id)
    }
}
