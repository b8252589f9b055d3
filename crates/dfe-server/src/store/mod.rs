//! Persistence seam for the ingestion pipeline
//!
//! The coordinator only talks to [`DocumentStore`] and the transaction type
//! it hands out. [`PgStore`] is the production backend; [`MemoryStore`]
//! backs the test suite and honours the same uniqueness and atomicity rules.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dfe_common::{AccessKey, Plate, TaxId};
use thiserror::Error;
use uuid::Uuid;

use crate::ingest::parsed::{Party, VehicleData};
use crate::models::{DocumentState, PrimaryDocument, Upload};

/// SQLSTATE codes Postgres uses for retryable concurrency failures.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Error, Debug)]
pub enum StoreError {
    /// A concurrent writer inserted the same natural key first.
    #[error("Unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    /// Connection, pool or concurrency failure; safe to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The access key is already stored as a different document kind.
    #[error("Document {access_key} exists with a different kind")]
    KindConflict { access_key: String },

    /// Stored row could not be mapped back to a model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Non-transient backend failure.
    #[error("Store failure: {0}")]
    Backend(String),

    #[error("Database query failed: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)) =>
            {
                StoreError::Unavailable(db.message().to_string())
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a document upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: Uuid,
    pub created: bool,
}

/// One atomic unit of ingestion work.
///
/// Nothing written through a transaction is visible to others until
/// [`commit`](StoreTransaction::commit). Dropping it without committing
/// discards every write.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_counterparty(&mut self, tax_id: &TaxId) -> StoreResult<Option<Uuid>>;

    /// Fails with [`StoreError::UniqueViolation`] when the tax id already exists.
    async fn insert_counterparty(&mut self, party: &Party) -> StoreResult<Uuid>;

    async fn find_vehicle(&mut self, plate: &Plate) -> StoreResult<Option<Uuid>>;

    /// Fails with [`StoreError::UniqueViolation`] when the plate already exists.
    async fn insert_vehicle(&mut self, vehicle: &VehicleData) -> StoreResult<Uuid>;

    /// Looks up a document and locks it for the rest of the transaction.
    async fn find_document(&mut self, key: &AccessKey) -> StoreResult<Option<DocumentState>>;

    /// Insert or update by access key, keeping cancellation and closure sticky.
    async fn upsert_document(&mut self, document: &PrimaryDocument) -> StoreResult<UpsertOutcome>;

    /// Link a manifest to the referenced waybills that already exist.
    /// Returns how many links are in place afterwards for those keys.
    async fn link_waybills(&mut self, manifest_id: Uuid, keys: &[AccessKey]) -> StoreResult<usize>;

    async fn mark_cancelled(&mut self, document_id: Uuid) -> StoreResult<()>;

    async fn mark_closed(&mut self, document_id: Uuid, closed_at: DateTime<Utc>) -> StoreResult<()>;

    /// Move a pending upload to PROCESSED. Returns false when it was not pending.
    async fn mark_upload_processed(&mut self, upload_id: Uuid, key: &AccessKey) -> StoreResult<bool>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    type Tx: StoreTransaction + 'static;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn create_upload(&self, filename: &str) -> StoreResult<Upload>;

    /// Create several pending uploads atomically.
    async fn create_uploads(&self, filenames: &[String]) -> StoreResult<Vec<Upload>>;

    /// Move a pending upload to FAILED. Returns false when it was not pending.
    async fn mark_upload_failed(&self, upload_id: Uuid, detail: &str) -> StoreResult<bool>;

    async fn get_upload(&self, upload_id: Uuid) -> StoreResult<Option<Upload>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(StoreError::Unavailable("pool timed out".into()).is_transient());
        assert!(!StoreError::Backend("disk full".into()).is_transient());
        assert!(!StoreError::UniqueViolation { constraint: "x".into() }.is_transient());
        assert!(!StoreError::NotFound("upload".into()).is_transient());
    }

    #[test]
    fn test_sqlx_error_mapping() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_transient());
        assert!(matches!(StoreError::from(sqlx::Error::RowNotFound), StoreError::NotFound(_)));
        assert!(matches!(
            StoreError::from(sqlx::Error::Protocol("bad frame".into())),
            StoreError::Database(_)
        ));
    }
}
