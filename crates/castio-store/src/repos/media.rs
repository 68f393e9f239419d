//! Media record repository.
//!
//! Media rows live under the owning identity's partition with edges ordered
//! by post time, so listing an account's media is one prefix scan. A reverse
//! map keyed by a hash of (platform, external media id) supports point
//! lookups by external id.

use std::sync::Arc;

use castio_core::ids::{IdentityId, MediaId};
use castio_core::types::{MediaKind, PlatformKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::StoreResult;
use crate::key;
use crate::models::media::MediaRecord;
use crate::store::{EdgeStore, RowKey, StoredRow};

/// Value of a media reverse-map row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MediaMapEntry {
    identity_id: IdentityId,
    edge: String,
}

/// Repository for [`MediaRecord`] rows.
pub struct MediaRepository {
    store: Arc<dyn EdgeStore>,
}

impl MediaRepository {
    /// Create a repository over a store.
    #[must_use]
    pub fn new(store: Arc<dyn EdgeStore>) -> Self {
        Self { store }
    }

    fn decode(row: &StoredRow) -> StoreResult<MediaRecord> {
        let mut record: MediaRecord = row.decode()?;
        record.updated_at = row.version;
        Ok(record)
    }

    fn edge_of(record: &MediaRecord) -> String {
        key::media_edge(record.posted_at, &record.external_id)
    }

    /// All media of an identity, optionally filtered by kind, excluding
    /// expired records unless asked for.
    #[instrument(skip(self))]
    pub async fn list_for_identity(
        &self,
        identity_id: IdentityId,
        kind: Option<MediaKind>,
        include_expired: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<MediaRecord>> {
        let rows = self
            .store
            .scan_prefix(&identity_id.to_string(), key::MEDIA_EDGE_PREFIX)
            .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = Self::decode(row)?;
            if let Some(kind) = kind {
                if record.kind != kind {
                    continue;
                }
            }
            if !include_expired && record.is_expired(now) {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Stories of an identity posted at or after `since`.
    pub async fn recent_stories(
        &self,
        identity_id: IdentityId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<MediaRecord>> {
        let stories = self
            .list_for_identity(identity_id, Some(MediaKind::Story), true, Utc::now())
            .await?;
        Ok(stories.into_iter().filter(|s| s.posted_at >= since).collect())
    }

    /// Upsert one media record along with its reverse-map entry.
    #[instrument(skip(self, record), fields(media_id = %record.id))]
    pub async fn save(&self, platform: PlatformKind, record: &mut MediaRecord) -> StoreResult<()> {
        let edge = Self::edge_of(record);
        let row = self
            .store
            .put(
                &record.identity_id.to_string(),
                &edge,
                serde_json::to_value(&*record)?,
            )
            .await?;
        record.updated_at = row.version;

        let map = MediaMapEntry {
            identity_id: record.identity_id,
            edge,
        };
        self.store
            .put(
                &key::media_map_partition(platform, &record.external_id),
                key::MAP_EDGE,
                serde_json::to_value(map)?,
            )
            .await?;
        Ok(())
    }

    /// Batch upsert of media records and their reverse maps.
    #[instrument(skip(self, records))]
    pub async fn batch_save(
        &self,
        platform: PlatformKind,
        records: &[MediaRecord],
    ) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(records.len() * 2);
        for record in records {
            let edge = Self::edge_of(record);
            rows.push((
                RowKey::new(record.identity_id.to_string(), edge.clone()),
                serde_json::to_value(record)?,
            ));
            rows.push((
                RowKey::new(
                    key::media_map_partition(platform, &record.external_id),
                    key::MAP_EDGE,
                ),
                serde_json::to_value(MediaMapEntry {
                    identity_id: record.identity_id,
                    edge,
                })?,
            ));
        }
        self.store.batch_put(rows).await
    }

    /// Point lookup by (platform, external media id).
    #[instrument(skip(self))]
    pub async fn find_by_external(
        &self,
        platform: PlatformKind,
        external_media_id: &str,
    ) -> StoreResult<Option<MediaRecord>> {
        let partition = key::media_map_partition(platform, external_media_id);
        let Some(map_row) = self.store.get(&partition, key::MAP_EDGE).await? else {
            return Ok(None);
        };
        let entry: MediaMapEntry = map_row.decode()?;
        let Some(row) = self
            .store
            .get(&entry.identity_id.to_string(), &entry.edge)
            .await?
        else {
            return Ok(None);
        };
        if row.deleted {
            return Ok(None);
        }
        Ok(Some(Self::decode(&row)?))
    }

    /// Hard-remove expired media rows of an identity. Completion media is
    /// exempt. Returns how many rows were purged.
    #[instrument(skip(self))]
    pub async fn purge_expired(
        &self,
        identity_id: IdentityId,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let records = self
            .list_for_identity(identity_id, None, true, now)
            .await?;
        let mut purged = 0;
        for record in records {
            if record.completion || !record.is_expired(now) {
                continue;
            }
            self.store
                .remove(&identity_id.to_string(), &Self::edge_of(&record))
                .await?;
            purged += 1;
        }
        Ok(purged)
    }

    /// The stat-row partition for a media record; stat rows hang off the
    /// media id rather than the identity.
    #[must_use]
    pub fn stat_partition(media_id: MediaId) -> String {
        media_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryEdgeStore;
    use chrono::Duration;

    fn repo() -> MediaRepository {
        MediaRepository::new(Arc::new(MemoryEdgeStore::new()))
    }

    fn record(identity_id: IdentityId, external_id: &str, kind: MediaKind) -> MediaRecord {
        MediaRecord::new(identity_id, external_id, kind, Utc::now())
    }

    #[tokio::test]
    async fn test_save_then_list() {
        let repo = repo();
        let identity_id = IdentityId::new();
        let mut a = record(identity_id, "m-1", MediaKind::Post);
        let mut b = record(identity_id, "m-2", MediaKind::Story);
        repo.save(PlatformKind::Instagram, &mut a).await.unwrap();
        repo.save(PlatformKind::Instagram, &mut b).await.unwrap();

        let all = repo
            .list_for_identity(identity_id, None, false, Utc::now())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let stories = repo
            .list_for_identity(identity_id, Some(MediaKind::Story), false, Utc::now())
            .await
            .unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].external_id, "m-2");
    }

    #[tokio::test]
    async fn test_find_by_external() {
        let repo = repo();
        let identity_id = IdentityId::new();
        let mut a = record(identity_id, "m-1", MediaKind::Post);
        repo.save(PlatformKind::Instagram, &mut a).await.unwrap();

        let found = repo
            .find_by_external(PlatformKind::Instagram, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, a.id);

        assert!(repo
            .find_by_external(PlatformKind::Tiktok, "m-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_records_are_filtered() {
        let repo = repo();
        let identity_id = IdentityId::new();
        let now = Utc::now();
        let mut expired = record(identity_id, "m-old", MediaKind::Post);
        expired.expires_at = Some(now - Duration::hours(1));
        repo.save(PlatformKind::Instagram, &mut expired)
            .await
            .unwrap();

        let live = repo
            .list_for_identity(identity_id, None, false, now)
            .await
            .unwrap();
        assert!(live.is_empty());

        let all = repo
            .list_for_identity(identity_id, None, true, now)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired_spares_completion_media() {
        let repo = repo();
        let identity_id = IdentityId::new();
        let now = Utc::now();

        let mut expired = record(identity_id, "m-old", MediaKind::Post);
        expired.expires_at = Some(now - Duration::hours(1));
        let mut pinned = record(identity_id, "m-proof", MediaKind::Post);
        pinned.expires_at = Some(now - Duration::hours(1));
        pinned.mark_completion();
        let mut live = record(identity_id, "m-new", MediaKind::Post);
        live.expires_at = Some(now + Duration::days(10));

        repo.batch_save(PlatformKind::Instagram, &[expired, pinned, live])
            .await
            .unwrap();

        let purged = repo.purge_expired(identity_id, now).await.unwrap();
        assert_eq!(purged, 1);

        let remaining = repo
            .list_for_identity(identity_id, None, true, now)
            .await
            .unwrap();
        let ids: Vec<_> = remaining.iter().map(|r| r.external_id.as_str()).collect();
        assert!(ids.contains(&"m-proof"));
        assert!(ids.contains(&"m-new"));
        assert!(!ids.contains(&"m-old"));
    }

    #[tokio::test]
    async fn test_recent_stories_filters_by_time() {
        let repo = repo();
        let identity_id = IdentityId::new();
        let now = Utc::now();

        let mut old = record(identity_id, "s-old", MediaKind::Story);
        old.posted_at = now - Duration::days(3);
        let mut fresh = record(identity_id, "s-new", MediaKind::Story);
        fresh.posted_at = now - Duration::hours(2);

        repo.batch_save(PlatformKind::Instagram, &[old, fresh])
            .await
            .unwrap();

        let recent = repo
            .recent_stories(identity_id, now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].external_id, "s-new");
    }
}
