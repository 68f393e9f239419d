//! In-memory [`EdgeStore`] implementation.
//!
//! Backs unit and integration tests and local development runs. Semantics
//! mirror the Postgres implementation, including version assignment and
//! conflict behavior.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{EdgeStore, RowKey, StoredRow};
use crate::error::{StoreError, StoreResult};

/// In-memory store keyed by (partition, edge).
#[derive(Default)]
pub struct MemoryEdgeStore {
    rows: RwLock<BTreeMap<(String, String), StoredRow>>,
}

impl MemoryEdgeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-soft-deleted) rows; test helper.
    #[must_use]
    pub fn live_rows(&self) -> usize {
        self.rows
            .read()
            .expect("store lock poisoned")
            .values()
            .filter(|r| !r.deleted)
            .count()
    }

    /// Version for a new write, strictly greater than the previous one even
    /// when the clock has not advanced between writes.
    fn next_version(prev: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        match prev {
            Some(p) if now <= p => p + Duration::microseconds(1),
            _ => now,
        }
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn get(&self, partition: &str, edge: &str) -> StoreResult<Option<StoredRow>> {
        let rows = self.rows.read().expect("store lock poisoned");
        Ok(rows
            .get(&(partition.to_string(), edge.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
    ) -> StoreResult<StoredRow> {
        let mut rows = self.rows.write().expect("store lock poisoned");
        let key = (partition.to_string(), edge.to_string());
        let version = Self::next_version(rows.get(&key).map(|r| r.version));
        let row = StoredRow {
            partition: partition.to_string(),
            edge: edge.to_string(),
            value,
            version,
            deleted: false,
        };
        rows.insert(key, row.clone());
        Ok(row)
    }

    async fn put_if_version(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
        expected: Option<DateTime<Utc>>,
    ) -> StoreResult<StoredRow> {
        let mut rows = self.rows.write().expect("store lock poisoned");
        let key = (partition.to_string(), edge.to_string());
        let current = rows.get(&key).map(|r| r.version);
        if current != expected {
            return Err(StoreError::conflict(partition, edge));
        }
        let row = StoredRow {
            partition: partition.to_string(),
            edge: edge.to_string(),
            value,
            version: Self::next_version(current),
            deleted: false,
        };
        rows.insert(key, row.clone());
        Ok(row)
    }

    async fn mark_deleted(&self, partition: &str, edge: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().expect("store lock poisoned");
        let key = (partition.to_string(), edge.to_string());
        if let Some(row) = rows.get_mut(&key) {
            row.deleted = true;
            row.version = Self::next_version(Some(row.version));
        }
        Ok(())
    }

    async fn remove(&self, partition: &str, edge: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().expect("store lock poisoned");
        rows.remove(&(partition.to_string(), edge.to_string()));
        Ok(())
    }

    async fn scan_prefix(&self, partition: &str, edge_prefix: &str) -> StoreResult<Vec<StoredRow>> {
        let rows = self.rows.read().expect("store lock poisoned");
        let start = (partition.to_string(), edge_prefix.to_string());
        Ok(rows
            .range(start..)
            .take_while(|((p, e), _)| p == partition && e.starts_with(edge_prefix))
            .filter(|(_, row)| !row.deleted)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn batch_get(&self, keys: &[RowKey]) -> StoreResult<Vec<StoredRow>> {
        let rows = self.rows.read().expect("store lock poisoned");
        Ok(keys
            .iter()
            .filter_map(|k| rows.get(&(k.partition.clone(), k.edge.clone())).cloned())
            .collect())
    }

    async fn batch_put(&self, entries: Vec<(RowKey, serde_json::Value)>) -> StoreResult<()> {
        for (key, value) in entries {
            self.put(&key.partition, &key.edge, value).await?;
        }
        Ok(())
    }
}
