//! Media stat repository.
//!
//! Stat rows are keyed (media id, `stat#<period>#<end-time>`). Writes go
//! through change detection: a snapshot is only written when it is new or
//! its content differs from the stored version, which keeps high-frequency
//! polling from churning storage.

use std::sync::Arc;

use castio_core::ids::MediaId;
use castio_core::types::StatPeriod;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::error::StoreResult;
use crate::key;
use crate::models::stats::MediaStatRecord;
use crate::store::{EdgeStore, RowKey};

/// Repository for [`MediaStatRecord`] rows.
pub struct StatRepository {
    store: Arc<dyn EdgeStore>,
}

impl StatRepository {
    /// Create a repository over a store.
    #[must_use]
    pub fn new(store: Arc<dyn EdgeStore>) -> Self {
        Self { store }
    }

    /// Point read of one snapshot.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        media_id: MediaId,
        period: StatPeriod,
        end_time: DateTime<Utc>,
    ) -> StoreResult<Option<MediaStatRecord>> {
        let row = self
            .store
            .get(&media_id.to_string(), &key::stat_edge(period, end_time))
            .await?;
        match row {
            Some(row) if !row.deleted => Ok(Some(row.decode()?)),
            _ => Ok(None),
        }
    }

    /// All snapshots of a media record.
    #[instrument(skip(self))]
    pub async fn list_for_media(&self, media_id: MediaId) -> StoreResult<Vec<MediaStatRecord>> {
        let rows = self
            .store
            .scan_prefix(&media_id.to_string(), key::STAT_EDGE_PREFIX)
            .await?;
        rows.iter().map(|r| r.decode()).collect()
    }

    /// Write the snapshots whose content is new or changed; skip the rest.
    /// Returns how many rows were actually written.
    #[instrument(skip(self, stats))]
    pub async fn put_changed(&self, stats: &[MediaStatRecord]) -> StoreResult<usize> {
        let mut changed = Vec::new();
        for stat in stats {
            let stored = self.get(stat.media_id, stat.period, stat.end_time).await?;
            match stored {
                Some(existing) if !existing.content_differs(stat) => {}
                _ => changed.push(stat),
            }
        }

        if changed.is_empty() {
            debug!(total = stats.len(), "No stat snapshots changed");
            return Ok(0);
        }

        let rows = changed
            .iter()
            .map(|stat| {
                Ok((
                    RowKey::new(
                        stat.media_id.to_string(),
                        key::stat_edge(stat.period, stat.end_time),
                    ),
                    serde_json::to_value(stat)?,
                ))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let written = rows.len();
        self.store.batch_put(rows).await?;
        debug!(written, total = stats.len(), "Wrote changed stat snapshots");
        Ok(written)
    }

    /// Hard-remove expired snapshots of a media record. Returns how many
    /// rows were purged.
    #[instrument(skip(self))]
    pub async fn purge_expired(
        &self,
        media_id: MediaId,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let stats = self.list_for_media(media_id).await?;
        let mut purged = 0;
        for stat in stats {
            if stat.expires_at.is_some_and(|at| at <= now) {
                self.store
                    .remove(
                        &media_id.to_string(),
                        &key::stat_edge(stat.period, stat.end_time),
                    )
                    .await?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryEdgeStore;
    use castio_core::ids::IdentityId;
    use chrono::Duration;

    fn repo() -> StatRepository {
        StatRepository::new(Arc::new(MemoryEdgeStore::new()))
    }

    fn snapshot(media_id: MediaId, end_time: DateTime<Utc>) -> MediaStatRecord {
        let mut stat =
            MediaStatRecord::new(media_id, IdentityId::new(), StatPeriod::Lifetime, end_time);
        stat.set_value("impressions", 500);
        stat.set_value("engagements", 120);
        stat
    }

    #[tokio::test]
    async fn test_put_changed_writes_new_snapshots() {
        let repo = repo();
        let media_id = MediaId::new();
        let end = Utc::now();
        let stat = snapshot(media_id, end);

        let written = repo.put_changed(std::slice::from_ref(&stat)).await.unwrap();
        assert_eq!(written, 1);

        let stored = repo
            .get(media_id, StatPeriod::Lifetime, end)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value("impressions"), 500);
    }

    #[tokio::test]
    async fn test_put_changed_skips_identical_snapshots() {
        let repo = repo();
        let media_id = MediaId::new();
        let end = Utc::now();
        let stat = snapshot(media_id, end);

        repo.put_changed(std::slice::from_ref(&stat)).await.unwrap();
        let written = repo.put_changed(std::slice::from_ref(&stat)).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_put_changed_rewrites_on_content_change() {
        let repo = repo();
        let media_id = MediaId::new();
        let end = Utc::now();
        let mut stat = snapshot(media_id, end);

        repo.put_changed(std::slice::from_ref(&stat)).await.unwrap();

        stat.set_value("impressions", 777);
        let written = repo.put_changed(std::slice::from_ref(&stat)).await.unwrap();
        assert_eq!(written, 1);

        let stored = repo
            .get(media_id, StatPeriod::Lifetime, end)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value("impressions"), 777);
    }

    #[tokio::test]
    async fn test_snapshots_are_distinct_per_period_and_end_time() {
        let repo = repo();
        let media_id = MediaId::new();
        let end = Utc::now();

        let mut day = snapshot(media_id, end);
        day.period = StatPeriod::Day;
        let lifetime = snapshot(media_id, end);
        let later = snapshot(media_id, end + Duration::days(1));

        let written = repo
            .put_changed(&[day, lifetime, later])
            .await
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(repo.list_for_media(media_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let repo = repo();
        let media_id = MediaId::new();
        let now = Utc::now();

        let mut expired = snapshot(media_id, now - Duration::days(40));
        expired.expires_at = Some(now - Duration::days(1));
        let mut live = snapshot(media_id, now);
        live.expires_at = Some(now + Duration::days(30));

        repo.put_changed(&[expired, live]).await.unwrap();
        let purged = repo.purge_expired(media_id, now).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(repo.list_for_media(media_id).await.unwrap().len(), 1);
    }
}
