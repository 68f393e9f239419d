//! Incremental media reconciliation.
//!
//! Diffs remotely fetched media against stored records, persisting only what
//! actually changed, and collects per-media insight snapshots with per-item
//! failure handling. High-frequency polling must not churn storage: an
//! identical remote payload produces zero writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use castio_core::types::{MediaKind, StatPeriod};
use castio_platform::{PlatformClient, PlatformError, RemoteInsight, RemoteMedia};
use castio_store::{MediaRecord, MediaRepository, MediaStatRecord, PublisherIdentity};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::error::SyncResult;
use crate::events::{EventPublisher, SyncEvent};
use crate::policy::SyncPolicy;
use crate::stats::StatEnvelope;

/// Result of one reconcile pass for one content kind.
#[derive(Debug)]
pub struct ReconcileReport {
    /// The authoritative working set: what downstream insight fetching
    /// operates on.
    pub working_set: Vec<MediaRecord>,

    /// Records actually written (new or changed).
    pub written: usize,

    /// Records seen for the first time.
    pub discovered: usize,
}

/// Merges remote media into storage and gathers per-media stats.
pub struct MediaReconciler {
    media: Arc<MediaRepository>,
    events: Arc<dyn EventPublisher>,
    policy: SyncPolicy,
}

impl MediaReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        media: Arc<MediaRepository>,
        events: Arc<dyn EventPublisher>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            media,
            events,
            policy,
        }
    }

    /// Merge one kind's remote fetch result into storage.
    ///
    /// An empty `remote` means the conditional fetch reported no change, so
    /// the stored records are the working set and nothing is written.
    /// Otherwise the remote set is authoritative: each item is matched to a
    /// stored record by external id, changed fields are updated, and only
    /// dirty records are persisted. Stored records absent from a non-empty
    /// remote set stay untouched in storage but leave the working set.
    #[instrument(skip(self, identity, remote), fields(identity_id = %identity.id, remote = remote.len()))]
    pub async fn reconcile(
        &self,
        identity: &PublisherIdentity,
        kind: MediaKind,
        remote: Vec<RemoteMedia>,
        now: DateTime<Utc>,
    ) -> SyncResult<ReconcileReport> {
        let local = self
            .media
            .list_for_identity(identity.id, Some(kind), false, now)
            .await?;

        if remote.is_empty() {
            debug!(stored = local.len(), "No remote change; using stored records");
            return Ok(ReconcileReport {
                working_set: local,
                written: 0,
                discovered: 0,
            });
        }

        let mut by_external: HashMap<String, MediaRecord> = local
            .into_iter()
            .map(|r| (r.external_id.clone(), r))
            .collect();

        let mut working_set = Vec::with_capacity(remote.len());
        let mut dirty = Vec::new();
        let mut discovered = 0;

        for item in remote {
            match by_external.remove(&item.external_id) {
                Some(record) => {
                    let (record, changed) = self.apply_remote(record, &item, now);
                    if changed {
                        dirty.push(record.clone());
                    }
                    working_set.push(record);
                }
                None => {
                    let record = self.build_new(identity, kind, &item, now);
                    discovered += 1;
                    self.events
                        .publish(SyncEvent::MediaReceived {
                            identity_id: identity.id,
                            media_id: record.id,
                            external_id: record.external_id.clone(),
                            kind: record.kind,
                        })
                        .await;
                    dirty.push(record.clone());
                    working_set.push(record);
                }
            }
        }

        self.media.batch_save(identity.platform, &dirty).await?;
        debug!(
            written = dirty.len(),
            discovered,
            working_set = working_set.len(),
            "Reconciled media"
        );
        Ok(ReconcileReport {
            working_set,
            written: dirty.len(),
            discovered,
        })
    }

    /// Fold a remote item into a stored record; returns whether anything
    /// content-bearing changed.
    fn apply_remote(
        &self,
        mut record: MediaRecord,
        item: &RemoteMedia,
        now: DateTime<Utc>,
    ) -> (MediaRecord, bool) {
        let mut changed = false;

        if record.like_count != item.like_count {
            record.like_count = item.like_count;
            changed = true;
        }
        if record.comment_count != item.comment_count {
            record.comment_count = item.comment_count;
            changed = true;
        }
        if record.kind == MediaKind::Unknown && item.kind != MediaKind::Unknown {
            record.kind = item.kind;
            changed = true;
        }

        // CDN URLs rotate; pinned records keep theirs until they age out.
        if record.should_refresh_urls(self.policy.url_refresh_days, now)
            && (record.media_url != item.media_url || record.thumbnail_url != item.thumbnail_url)
        {
            record.media_url = item.media_url.clone();
            record.thumbnail_url = item.thumbnail_url.clone();
            record.urls_updated_at = now;
            changed = true;
        }

        if changed {
            record.last_synced_at = now;
        }
        (record, changed)
    }

    fn build_new(
        &self,
        identity: &PublisherIdentity,
        kind: MediaKind,
        item: &RemoteMedia,
        now: DateTime<Utc>,
    ) -> MediaRecord {
        let kind = if item.kind == MediaKind::Unknown {
            kind
        } else {
            item.kind
        };
        let mut record = MediaRecord::new(identity.id, &item.external_id, kind, item.posted_at);
        record.like_count = item.like_count;
        record.comment_count = item.comment_count;
        record.media_url = item.media_url.clone();
        record.thumbnail_url = item.thumbnail_url.clone();
        record.urls_updated_at = now;
        record.last_synced_at = now;
        // Expiry tracks the post time, so repeated syncs of the same item
        // compute the same window.
        record.expires_at = Some(item.posted_at + self.policy.retention());
        record
    }

    /// Fetch insight snapshots for a working set, newest first.
    ///
    /// Items outside the retention window are fetched only while the total
    /// stays under the minimum insight floor. Per-item outcomes:
    /// content-precondition errors bump the item's counter (permanent skip
    /// once capped), permission-class failures are collected, and the first
    /// generic failure aborts. A batch where every attempt past the
    /// threshold failed permission-class surfaces as one permission-class
    /// error, so the executor records it as step backoff.
    #[instrument(skip_all, fields(identity_id = %identity.id, records = records.len()))]
    pub async fn collect_media_stats(
        &self,
        client: &dyn PlatformClient,
        token: &str,
        identity: &PublisherIdentity,
        records: &[MediaRecord],
        now: DateTime<Utc>,
    ) -> SyncResult<Vec<StatEnvelope>> {
        let mut ordered: Vec<&MediaRecord> = records.iter().collect();
        ordered.sort_by_key(|r| std::cmp::Reverse(r.posted_at));

        let mut envelopes = Vec::new();
        let mut fetched = 0usize;
        let mut permission_failures = 0usize;
        let mut first_permission: Option<PlatformError> = None;

        for record in ordered {
            if record.is_preconversion_capped(self.policy.preconversion_cap) {
                continue;
            }
            if !record.is_in_window(self.policy.retention_days, now)
                && fetched >= self.policy.min_insight_count
            {
                continue;
            }

            match client
                .fetch_media_insights(token, &record.external_id, StatPeriod::Lifetime)
                .await
            {
                Ok(series) => {
                    fetched += 1;
                    envelopes.extend(self.build_stats(record, &series, now));
                }
                Err(e) if e.is_preconversion() => {
                    let mut updated = record.clone();
                    let count = updated.record_preconversion_error(now);
                    self.media.save(identity.platform, &mut updated).await?;
                    debug!(
                        media_id = %record.id,
                        count,
                        "Content predates account conversion; skipping"
                    );
                }
                Err(e) if e.is_permission_class() => {
                    permission_failures += 1;
                    first_permission.get_or_insert(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if fetched == 0 && permission_failures > self.policy.permission_failure_threshold {
            // Every attempt was denied; treat the whole step as a
            // permission failure rather than a per-item problem.
            return Err(PlatformError::permission(format!(
                "all {permission_failures} media insight fetches denied: {}",
                first_permission.map_or_else(String::new, |e| e.to_string())
            ))
            .into());
        }
        if permission_failures > 0 {
            warn!(
                permission_failures,
                fetched, "Some media insight fetches were denied"
            );
        }

        Ok(envelopes)
    }

    /// Group one media item's insight series into stat snapshots, one per
    /// (period, end time).
    fn build_stats(
        &self,
        record: &MediaRecord,
        series: &[RemoteInsight],
        now: DateTime<Utc>,
    ) -> Vec<StatEnvelope> {
        let mut grouped: BTreeMap<(StatPeriod, DateTime<Utc>), MediaStatRecord> = BTreeMap::new();
        for insight in series {
            for value in &insight.values {
                let stat = grouped
                    .entry((insight.period, value.end_time))
                    .or_insert_with(|| {
                        let mut stat = MediaStatRecord::new(
                            record.id,
                            record.identity_id,
                            insight.period,
                            value.end_time,
                        );
                        stat.expires_at = Some(now + self.policy.retention());
                        stat
                    });
                stat.set_value(&insight.name, value.value);
            }
        }
        grouped
            .into_values()
            .map(|stat| StatEnvelope::new(stat, record.kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CapturingEventPublisher;
    use async_trait::async_trait;
    use castio_core::ids::IdentityId;
    use castio_core::types::{AccountKind, LinkState, PlatformKind};
    use castio_platform::{PlatformResult, RemoteProfile};
    use castio_store::MemoryEdgeStore;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn identity() -> PublisherIdentity {
        PublisherIdentity::new_connected(
            PlatformKind::Instagram,
            "1784",
            "creator",
            AccountKind::User,
            LinkState::Full,
        )
    }

    fn setup() -> (
        MediaReconciler,
        Arc<MediaRepository>,
        Arc<CapturingEventPublisher>,
    ) {
        let store = Arc::new(MemoryEdgeStore::new());
        let media = Arc::new(MediaRepository::new(store));
        let events = Arc::new(CapturingEventPublisher::new());
        let reconciler = MediaReconciler::new(
            Arc::clone(&media),
            Arc::clone(&events) as Arc<dyn EventPublisher>,
            SyncPolicy::default(),
        );
        (reconciler, media, events)
    }

    fn remote(external_id: &str, likes: i64) -> RemoteMedia {
        let mut item = RemoteMedia::new(external_id, MediaKind::Post, Utc::now());
        item.like_count = likes;
        item.media_url = Some(format!("https://cdn/{external_id}.jpg"));
        item
    }

    #[tokio::test]
    async fn test_new_items_are_stored_and_announced() {
        let (reconciler, media, events) = setup();
        let identity = identity();
        let now = Utc::now();

        let report = reconciler
            .reconcile(
                &identity,
                MediaKind::Post,
                vec![remote("m-1", 10), remote("m-2", 20)],
                now,
            )
            .await
            .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.discovered, 2);
        assert_eq!(
            media
                .list_for_identity(identity.id, None, false, now)
                .await
                .unwrap()
                .len(),
            2
        );
        let received: Vec<_> = events
            .events()
            .into_iter()
            .filter(|e| matches!(e, SyncEvent::MediaReceived { .. }))
            .collect();
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn test_identical_second_run_writes_nothing() {
        let (reconciler, _, events) = setup();
        let identity = identity();
        let now = Utc::now();
        let payload = vec![remote("m-1", 10), remote("m-2", 20)];

        let first = reconciler
            .reconcile(&identity, MediaKind::Post, payload.clone(), now)
            .await
            .unwrap();
        assert_eq!(first.written, 2);
        let _ = events.take();

        let second = reconciler
            .reconcile(&identity, MediaKind::Post, payload, now)
            .await
            .unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.discovered, 0);
        assert_eq!(second.working_set.len(), 2);
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_changed_counters_are_written() {
        let (reconciler, media, _) = setup();
        let identity = identity();
        let now = Utc::now();

        reconciler
            .reconcile(&identity, MediaKind::Post, vec![remote("m-1", 10)], now)
            .await
            .unwrap();

        let report = reconciler
            .reconcile(&identity, MediaKind::Post, vec![remote("m-1", 15)], now)
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.discovered, 0);

        let stored = media
            .find_by_external(PlatformKind::Instagram, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.like_count, 15);
    }

    #[tokio::test]
    async fn test_empty_remote_uses_stored_records() {
        let (reconciler, _, _) = setup();
        let identity = identity();
        let now = Utc::now();

        reconciler
            .reconcile(
                &identity,
                MediaKind::Post,
                vec![remote("m-1", 10), remote("m-2", 20)],
                now,
            )
            .await
            .unwrap();

        let report = reconciler
            .reconcile(&identity, MediaKind::Post, Vec::new(), now)
            .await
            .unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.working_set.len(), 2);
    }

    #[tokio::test]
    async fn test_pinned_record_keeps_fresh_urls() {
        let (reconciler, media, _) = setup();
        let identity = identity();
        let now = Utc::now();

        reconciler
            .reconcile(&identity, MediaKind::Post, vec![remote("m-1", 10)], now)
            .await
            .unwrap();
        let mut stored = media
            .find_by_external(PlatformKind::Instagram, "m-1")
            .await
            .unwrap()
            .unwrap();
        stored.mark_completion();
        media
            .save(PlatformKind::Instagram, &mut stored)
            .await
            .unwrap();

        let mut rotated = remote("m-1", 10);
        rotated.media_url = Some("https://cdn/rotated.jpg".to_string());
        let report = reconciler
            .reconcile(&identity, MediaKind::Post, vec![rotated], now)
            .await
            .unwrap();

        // Fresh pinned URLs are left alone, so nothing was dirty.
        assert_eq!(report.written, 0);
        let stored = media
            .find_by_external(PlatformKind::Instagram, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.media_url.as_deref(), Some("https://cdn/m-1.jpg"));
    }

    /// Insight client stub driven by per-media behaviors.
    struct InsightStub {
        responses: HashMap<String, PlatformResult<Vec<RemoteInsight>>>,
        calls: Mutex<Vec<String>>,
    }

    impl InsightStub {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn ok(mut self, media_id: &str, engagements: i64) -> Self {
            self.responses.insert(
                media_id.to_string(),
                Ok(vec![RemoteInsight::single(
                    "engagements",
                    StatPeriod::Lifetime,
                    engagements,
                    Utc::now(),
                )]),
            );
            self
        }

        fn err(mut self, media_id: &str, error: PlatformError) -> Self {
            self.responses.insert(media_id.to_string(), Err(error));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlatformClient for InsightStub {
        fn platform(&self) -> PlatformKind {
            PlatformKind::Instagram
        }

        async fn fetch_profile(
            &self,
            _token: &str,
            _external_id: &str,
            _honor_cache: bool,
        ) -> PlatformResult<Option<RemoteProfile>> {
            Ok(None)
        }

        async fn fetch_media(
            &self,
            _token: &str,
            _external_id: &str,
            _kind: MediaKind,
            _since: Option<&str>,
        ) -> PlatformResult<Vec<RemoteMedia>> {
            Ok(Vec::new())
        }

        async fn fetch_media_insights(
            &self,
            _token: &str,
            media_external_id: &str,
            _period: StatPeriod,
        ) -> PlatformResult<Vec<RemoteInsight>> {
            self.calls
                .lock()
                .unwrap()
                .push(media_external_id.to_string());
            match self.responses.get(media_external_id) {
                Some(Ok(series)) => Ok(series.clone()),
                Some(Err(PlatformError::PermissionDenied { message })) => {
                    Err(PlatformError::permission(message.clone()))
                }
                Some(Err(PlatformError::PreconversionContent { media_external_id })) => {
                    Err(PlatformError::preconversion(media_external_id.clone()))
                }
                Some(Err(e)) => Err(PlatformError::api(e.to_string())),
                None => Ok(Vec::new()),
            }
        }

        async fn fetch_daily_insights(
            &self,
            _token: &str,
            _external_id: &str,
        ) -> PlatformResult<Vec<RemoteInsight>> {
            Ok(Vec::new())
        }

        async fn fetch_lifetime_insights(
            &self,
            _token: &str,
            _external_id: &str,
        ) -> PlatformResult<Vec<RemoteInsight>> {
            Ok(Vec::new())
        }
    }

    fn record_with(
        identity_id: IdentityId,
        external_id: &str,
        posted_at: DateTime<Utc>,
    ) -> MediaRecord {
        MediaRecord::new(identity_id, external_id, MediaKind::Post, posted_at)
    }

    #[tokio::test]
    async fn test_collect_stats_builds_envelopes() {
        let (reconciler, _, _) = setup();
        let identity = identity();
        let now = Utc::now();
        let records = vec![record_with(identity.id, "m-1", now - Duration::days(1))];
        let client = InsightStub::new().ok("m-1", 120);

        let envelopes = reconciler
            .collect_media_stats(&client, "token", &identity, &records, now)
            .await
            .unwrap();

        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].stat.value("engagements"), 120);
        assert_eq!(envelopes[0].media_kind, MediaKind::Post);
    }

    #[tokio::test]
    async fn test_preconversion_error_bumps_counter_and_skips() {
        let (reconciler, media, _) = setup();
        let identity = identity();
        let now = Utc::now();

        let mut record = record_with(identity.id, "m-old", now - Duration::days(2));
        media
            .save(PlatformKind::Instagram, &mut record)
            .await
            .unwrap();
        let client = InsightStub::new().err("m-old", PlatformError::preconversion("m-old"));

        let envelopes = reconciler
            .collect_media_stats(
                &client,
                "token",
                &identity,
                std::slice::from_ref(&record),
                now,
            )
            .await
            .unwrap();

        assert!(envelopes.is_empty());
        let stored = media
            .find_by_external(PlatformKind::Instagram, "m-old")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.preconversion_errors, 1);
    }

    #[tokio::test]
    async fn test_capped_preconversion_item_is_not_fetched() {
        let (reconciler, _, _) = setup();
        let identity = identity();
        let now = Utc::now();

        let mut record = record_with(identity.id, "m-old", now - Duration::days(2));
        record.preconversion_errors = 15;
        let client = InsightStub::new().ok("m-old", 5);

        let envelopes = reconciler
            .collect_media_stats(&client, "token", &identity, &[record], now)
            .await
            .unwrap();

        assert!(envelopes.is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_window_items_respect_insight_floor() {
        let identity = identity();
        let now = Utc::now();
        let reconciler = MediaReconciler::new(
            Arc::new(MediaRepository::new(Arc::new(MemoryEdgeStore::new()))),
            Arc::new(CapturingEventPublisher::new()),
            SyncPolicy {
                min_insight_count: 2,
                ..SyncPolicy::default()
            },
        );

        // One in-window item plus three far outside the window.
        let mut records = vec![record_with(identity.id, "m-new", now - Duration::days(1))];
        for (i, days) in [40, 50, 60].iter().enumerate() {
            records.push(record_with(
                identity.id,
                &format!("m-old-{i}"),
                now - Duration::days(*days),
            ));
        }
        let client = InsightStub::new()
            .ok("m-new", 1)
            .ok("m-old-0", 1)
            .ok("m-old-1", 1)
            .ok("m-old-2", 1);

        let envelopes = reconciler
            .collect_media_stats(&client, "token", &identity, &records, now)
            .await
            .unwrap();

        // Newest-first: the in-window item and the newest out-of-window item
        // hit the floor of two; the rest are skipped.
        assert_eq!(envelopes.len(), 2);
        let called: HashSet<_> = client.calls().into_iter().collect();
        assert!(called.contains("m-new"));
        assert!(called.contains("m-old-0"));
        assert!(!called.contains("m-old-2"));
    }

    #[tokio::test]
    async fn test_all_permission_batch_escalates_as_permission_error() {
        let (reconciler, _, _) = setup();
        let identity = identity();
        let now = Utc::now();

        let mut records = Vec::new();
        let mut client = InsightStub::new();
        for i in 0..7 {
            let id = format!("m-{i}");
            records.push(record_with(identity.id, &id, now - Duration::days(1)));
            client = client.err(&id, PlatformError::permission("denied"));
        }

        let err = reconciler
            .collect_media_stats(&client, "token", &identity, &records, now)
            .await
            .unwrap_err();
        assert!(err.is_permission_class());
    }

    #[tokio::test]
    async fn test_partial_permission_failures_do_not_escalate() {
        let (reconciler, _, _) = setup();
        let identity = identity();
        let now = Utc::now();

        let mut records = Vec::new();
        let mut client = InsightStub::new();
        for i in 0..7 {
            let id = format!("m-{i}");
            records.push(record_with(identity.id, &id, now - Duration::days(1)));
            client = if i == 0 {
                client.ok(&id, 10)
            } else {
                client.err(&id, PlatformError::permission("denied"))
            };
        }

        let envelopes = reconciler
            .collect_media_stats(&client, "token", &identity, &records, now)
            .await
            .unwrap();
        assert_eq!(envelopes.len(), 1);
    }

    #[tokio::test]
    async fn test_generic_insight_failure_propagates() {
        let (reconciler, _, _) = setup();
        let identity = identity();
        let now = Utc::now();
        let records = vec![record_with(identity.id, "m-1", now - Duration::days(1))];
        let client = InsightStub::new().err("m-1", PlatformError::api("500"));

        let err = reconciler
            .collect_media_stats(&client, "token", &identity, &records, now)
            .await
            .unwrap_err();
        assert!(!err.is_permission_class());
    }
}
