//! Batch Database Module
//!
//! Durable storage for batch records and the event log, backed by SQLite
//! through sqlx.
//!
//! # Storage
//! - `batches`: current snapshot of every record, keyed by `batch_id`
//! - `batch_events`: the event log, keyed by `sequence`
//!
//! A mutation's record write and event insert share one SQL transaction.
//! Triggers make `batch_events` append-only and the identity columns of
//! `batches` immutable, so the guarantees hold below the registry too.

use crate::{config::DatabaseConfig, BatchEvent, BatchRecord, EventKind, RegistryError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS batches (
        batch_id INTEGER PRIMARY KEY,
        crop_type TEXT NOT NULL,
        origin_farm TEXT NOT NULL,
        harvest_date INTEGER NOT NULL,
        current_owner TEXT NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS batch_events (
        sequence INTEGER PRIMARY KEY,
        batch_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        recorded_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS batch_events_by_batch ON batch_events (batch_id, sequence)",
    "CREATE TRIGGER IF NOT EXISTS batch_events_no_update
        BEFORE UPDATE ON batch_events
        BEGIN SELECT RAISE(ABORT, 'batch_events is append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS batch_events_no_delete
        BEFORE DELETE ON batch_events
        BEGIN SELECT RAISE(ABORT, 'batch_events is append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS batches_fixed_columns
        BEFORE UPDATE OF batch_id, crop_type, origin_farm, harvest_date ON batches
        BEGIN SELECT RAISE(ABORT, 'batch identity columns are immutable'); END",
    "CREATE TRIGGER IF NOT EXISTS batches_no_delete
        BEFORE DELETE ON batches
        BEGIN SELECT RAISE(ABORT, 'batches cannot be deleted'); END",
];

/// SQLite-backed store for batch records and events
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database and apply the schema
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RegistryError> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        // Connections are never recycled: a recycled in-memory connection
        // would take its database with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(*statement).execute(&pool).await?;
        }

        info!(url = %config.url, "Batch database ready");
        Ok(Self { pool })
    }

    /// Durably write one accepted mutation
    ///
    /// Upserts the record's new snapshot and appends the event in a single
    /// transaction. On error nothing has been written.
    pub async fn commit(&self, record: &BatchRecord, event: &BatchEvent) -> Result<(), RegistryError> {
        let payload = serde_json::to_string(&event.kind)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO batches (batch_id, crop_type, origin_farm, harvest_date, current_owner, status)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (batch_id) DO UPDATE SET
                current_owner = excluded.current_owner,
                status = excluded.status",
        )
        .bind(to_sql("batch_id", record.batch_id)?)
        .bind(&record.crop_type)
        .bind(&record.origin_farm)
        .bind(record.harvest_date)
        .bind(&record.current_owner)
        .bind(&record.status)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO batch_events (sequence, batch_id, kind, payload, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(to_sql("sequence", event.sequence)?)
        .bind(to_sql("batch_id", event.batch_id)?)
        .bind(event.kind.name())
        .bind(payload)
        .bind(event.recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(batch_id = record.batch_id, sequence = event.sequence, "Mutation committed");
        Ok(())
    }

    /// All stored records, ordered by `batch_id`
    pub async fn load_batches(&self) -> Result<Vec<BatchRecord>, RegistryError> {
        let rows = sqlx::query(
            "SELECT batch_id, crop_type, origin_farm, harvest_date, current_owner, status
             FROM batches ORDER BY batch_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// The full event log, ordered by `sequence`
    pub async fn load_events(&self) -> Result<Vec<BatchEvent>, RegistryError> {
        let rows = sqlx::query(
            "SELECT sequence, batch_id, kind, payload, recorded_at
             FROM batch_events ORDER BY sequence",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// SQLite INTEGER is signed 64-bit
fn to_sql(column: &str, value: u64) -> Result<i64, RegistryError> {
    i64::try_from(value)
        .map_err(|_| RegistryError::OutOfRange(format!("{column} {value} exceeds SQLite INTEGER")))
}

fn from_sql(row: &SqliteRow, column: &str) -> Result<u64, RegistryError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| RegistryError::Corrupt(format!("negative {column}: {value}")))
}

fn record_from_row(row: &SqliteRow) -> Result<BatchRecord, RegistryError> {
    Ok(BatchRecord {
        batch_id: from_sql(row, "batch_id")?,
        crop_type: row.try_get("crop_type")?,
        origin_farm: row.try_get("origin_farm")?,
        harvest_date: row.try_get("harvest_date")?,
        current_owner: row.try_get("current_owner")?,
        status: row.try_get("status")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<BatchEvent, RegistryError> {
    let sequence = from_sql(row, "sequence")?;
    let kind_tag: String = row.try_get("kind")?;
    let payload: String = row.try_get("payload")?;
    let kind: EventKind = serde_json::from_str(&payload)?;

    if kind.name() != kind_tag {
        return Err(RegistryError::Corrupt(format!(
            "event {sequence} is tagged {kind_tag} but carries a {} payload",
            kind.name()
        )));
    }

    Ok(BatchEvent {
        sequence,
        batch_id: from_sql(row, "batch_id")?,
        kind,
        recorded_at: row.try_get("recorded_at")?,
    })
}
