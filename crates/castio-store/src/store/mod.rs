//! The durable key/value-with-secondary-index store abstraction.
//!
//! The sync core never talks to a database engine directly; it goes through
//! [`EdgeStore`], which models the capabilities the storage backend is
//! required to provide: point reads/writes by (partition id, edge key),
//! range scans by edge prefix, batch get/put, optimistic conditional put,
//! and a soft-delete marker. There is no multi-row transaction — callers
//! that need cross-row atomicity record compensating actions instead.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Address of a stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey {
    /// Partition id.
    pub partition: String,
    /// Edge key within the partition.
    pub edge: String,
}

impl RowKey {
    /// Create a row key.
    #[must_use]
    pub fn new(partition: impl Into<String>, edge: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            edge: edge.into(),
        }
    }
}

/// One stored row: key, JSON value, version timestamp, soft-delete marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRow {
    /// Partition id.
    pub partition: String,
    /// Edge key within the partition.
    pub edge: String,
    /// The row's JSON payload.
    pub value: serde_json::Value,
    /// Version timestamp assigned by the store on every write; the token
    /// for optimistic conditional puts.
    pub version: DateTime<Utc>,
    /// Soft-delete marker. Soft-deleted rows are returned by reads so that
    /// callers can distinguish "deleted" from "never existed".
    pub deleted: bool,
}

impl StoredRow {
    /// The row's key.
    #[must_use]
    pub fn key(&self) -> RowKey {
        RowKey::new(self.partition.clone(), self.edge.clone())
    }

    /// Decode the row's payload into a typed model.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Durable key/value store with secondary-index-style prefix scans.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Point read. Returns `None` when the row never existed; soft-deleted
    /// rows are returned with their marker set.
    async fn get(&self, partition: &str, edge: &str) -> StoreResult<Option<StoredRow>>;

    /// Unconditional upsert. Clears any soft-delete marker and assigns a
    /// fresh version.
    async fn put(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
    ) -> StoreResult<StoredRow>;

    /// Optimistic conditional upsert.
    ///
    /// With `expected = Some(version)` the write succeeds only if the stored
    /// version still matches; with `expected = None` it succeeds only if the
    /// row does not exist yet. Returns [`crate::StoreError::Conflict`]
    /// otherwise.
    async fn put_if_version(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
        expected: Option<DateTime<Utc>>,
    ) -> StoreResult<StoredRow>;

    /// Set the soft-delete marker. Missing rows are a no-op.
    async fn mark_deleted(&self, partition: &str, edge: &str) -> StoreResult<()>;

    /// Hard-remove a row. Reserved for the losing side of an identity merge
    /// and for purging expired media/stat rows.
    async fn remove(&self, partition: &str, edge: &str) -> StoreResult<()>;

    /// Range scan: all rows of a partition whose edge key starts with the
    /// prefix, ordered by edge key. Soft-deleted rows are excluded.
    async fn scan_prefix(&self, partition: &str, edge_prefix: &str) -> StoreResult<Vec<StoredRow>>;

    /// Batch point read. Missing rows are absent from the result; order is
    /// not guaranteed.
    async fn batch_get(&self, keys: &[RowKey]) -> StoreResult<Vec<StoredRow>>;

    /// Batch unconditional upsert.
    async fn batch_put(&self, rows: Vec<(RowKey, serde_json::Value)>) -> StoreResult<()>;
}
