//! Postgres [`EdgeStore`] implementation.
//!
//! All rows live in one `edges` table keyed by (partition id, edge key) with
//! a `jsonb` payload, a version timestamp, and a soft-delete marker.
//! Conditional writes are expressed as version-guarded UPDATEs and
//! insert-if-absent, matching the optimistic-concurrency contract of the
//! trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::{EdgeStore, RowKey, StoredRow};
use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS edges (
    partition_id TEXT NOT NULL,
    edge_key     TEXT NOT NULL,
    value        JSONB NOT NULL,
    version      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    deleted      BOOLEAN NOT NULL DEFAULT FALSE,
    PRIMARY KEY (partition_id, edge_key)
)
";

/// Postgres-backed edge store.
pub struct PgEdgeStore {
    pool: PgPool,
}

impl PgEdgeStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_from_pg(row: &sqlx::postgres::PgRow) -> StoredRow {
        StoredRow {
            partition: row.get("partition_id"),
            edge: row.get("edge_key"),
            value: row.get("value"),
            version: row.get("version"),
            deleted: row.get("deleted"),
        }
    }
}

#[async_trait]
impl EdgeStore for PgEdgeStore {
    #[instrument(skip(self))]
    async fn get(&self, partition: &str, edge: &str) -> StoreResult<Option<StoredRow>> {
        let row = sqlx::query(
            r"
            SELECT partition_id, edge_key, value, version, deleted
            FROM edges
            WHERE partition_id = $1 AND edge_key = $2
            ",
        )
        .bind(partition)
        .bind(edge)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_from_pg(&r)))
    }

    #[instrument(skip(self, value))]
    async fn put(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
    ) -> StoreResult<StoredRow> {
        let row = sqlx::query(
            r"
            INSERT INTO edges (partition_id, edge_key, value, version, deleted)
            VALUES ($1, $2, $3, NOW(), FALSE)
            ON CONFLICT (partition_id, edge_key) DO UPDATE SET
                value = EXCLUDED.value,
                version = GREATEST(NOW(), edges.version + INTERVAL '1 microsecond'),
                deleted = FALSE
            RETURNING partition_id, edge_key, value, version, deleted
            ",
        )
        .bind(partition)
        .bind(edge)
        .bind(&value)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::row_from_pg(&row))
    }

    #[instrument(skip(self, value))]
    async fn put_if_version(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
        expected: Option<DateTime<Utc>>,
    ) -> StoreResult<StoredRow> {
        let row = match expected {
            Some(version) => {
                sqlx::query(
                    r"
                    UPDATE edges
                    SET value = $3,
                        version = GREATEST(NOW(), version + INTERVAL '1 microsecond'),
                        deleted = FALSE
                    WHERE partition_id = $1 AND edge_key = $2 AND version = $4
                    RETURNING partition_id, edge_key, value, version, deleted
                    ",
                )
                .bind(partition)
                .bind(edge)
                .bind(&value)
                .bind(version)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"
                    INSERT INTO edges (partition_id, edge_key, value, version, deleted)
                    VALUES ($1, $2, $3, NOW(), FALSE)
                    ON CONFLICT (partition_id, edge_key) DO NOTHING
                    RETURNING partition_id, edge_key, value, version, deleted
                    ",
                )
                .bind(partition)
                .bind(edge)
                .bind(&value)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(|r| Self::row_from_pg(&r))
            .ok_or_else(|| StoreError::conflict(partition, edge))
    }

    #[instrument(skip(self))]
    async fn mark_deleted(&self, partition: &str, edge: &str) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE edges
            SET deleted = TRUE,
                version = GREATEST(NOW(), version + INTERVAL '1 microsecond')
            WHERE partition_id = $1 AND edge_key = $2
            ",
        )
        .bind(partition)
        .bind(edge)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, partition: &str, edge: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM edges WHERE partition_id = $1 AND edge_key = $2")
            .bind(partition)
            .bind(edge)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn scan_prefix(&self, partition: &str, edge_prefix: &str) -> StoreResult<Vec<StoredRow>> {
        let rows = sqlx::query(
            r"
            SELECT partition_id, edge_key, value, version, deleted
            FROM edges
            WHERE partition_id = $1
              AND edge_key LIKE $2
              AND deleted = FALSE
            ORDER BY edge_key
            ",
        )
        .bind(partition)
        .bind(format!("{edge_prefix}%"))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_from_pg).collect())
    }

    #[instrument(skip(self, keys))]
    async fn batch_get(&self, keys: &[RowKey]) -> StoreResult<Vec<StoredRow>> {
        let partitions: Vec<&str> = keys.iter().map(|k| k.partition.as_str()).collect();
        let edges: Vec<&str> = keys.iter().map(|k| k.edge.as_str()).collect();

        let rows = sqlx::query(
            r"
            SELECT e.partition_id, e.edge_key, e.value, e.version, e.deleted
            FROM edges e
            JOIN UNNEST($1::text[], $2::text[]) AS k(partition_id, edge_key)
              ON e.partition_id = k.partition_id AND e.edge_key = k.edge_key
            ",
        )
        .bind(&partitions)
        .bind(&edges)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_from_pg).collect())
    }

    #[instrument(skip(self, rows))]
    async fn batch_put(&self, rows: Vec<(RowKey, serde_json::Value)>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in rows {
            sqlx::query(
                r"
                INSERT INTO edges (partition_id, edge_key, value, version, deleted)
                VALUES ($1, $2, $3, NOW(), FALSE)
                ON CONFLICT (partition_id, edge_key) DO UPDATE SET
                    value = EXCLUDED.value,
                    version = GREATEST(NOW(), edges.version + INTERVAL '1 microsecond'),
                    deleted = FALSE
                ",
            )
            .bind(&key.partition)
            .bind(&key.edge)
            .bind(&value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
