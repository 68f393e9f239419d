//! Aggregate rollup stage.
//!
//! Buffers per-identity sums while the stream drains, then writes rolled-up
//! averages onto each owning identity's metric map and notifies downstream
//! caches. Stories are only available on the platform for about a day, so
//! whenever a story stat is observed the stage supplements the batch with a
//! lookup of the identity's recently stored stories.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use castio_core::ids::IdentityId;
use castio_store::{IdentityRepository, MediaRepository, MediaStatRecord, StoreError};
use chrono::Utc;
use tracing::{debug, warn};

use super::{
    round6, StageAction, StatEnvelope, StatStage, STAT_ENGAGEMENTS, STAT_IMPRESSIONS, STAT_REACH,
    STAT_SAVES, STAT_VIEWS,
};
use crate::error::SyncResult;
use crate::events::{EventPublisher, SyncEvent};
use crate::policy::SyncPolicy;

#[derive(Debug, Default, Clone)]
struct KindTotals {
    count: u64,
    engagement_sum: f64,
    true_engagement_sum: f64,
    engagements: i64,
    impressions: i64,
    saves: i64,
    views: i64,
    reach: i64,
}

impl KindTotals {
    fn add(&mut self, stat: &MediaStatRecord) {
        self.count += 1;
        self.engagement_sum += stat.engagement_rating.unwrap_or(0.0);
        self.true_engagement_sum += stat.true_engagement_rating.unwrap_or(0.0);
        self.engagements += stat.value(STAT_ENGAGEMENTS);
        self.impressions += stat.value(STAT_IMPRESSIONS);
        self.saves += stat.value(STAT_SAVES);
        self.views += stat.value(STAT_VIEWS);
        self.reach += stat.value(STAT_REACH);
    }

    fn write_metrics(&self, prefix: &str, metrics: &mut BTreeMap<String, f64>) {
        let n = self.count as f64;
        metrics.insert(format!("{prefix}_count"), n);
        metrics.insert(
            format!("{prefix}_engagement_avg"),
            round6(self.engagement_sum / n),
        );
        metrics.insert(
            format!("{prefix}_true_engagement_avg"),
            round6(self.true_engagement_sum / n),
        );
        metrics.insert(format!("{prefix}_engagements"), self.engagements as f64);
        metrics.insert(format!("{prefix}_impressions"), self.impressions as f64);
        metrics.insert(format!("{prefix}_saves"), self.saves as f64);
        metrics.insert(format!("{prefix}_views"), self.views as f64);
        metrics.insert(format!("{prefix}_reach"), self.reach as f64);
    }
}

#[derive(Debug, Default)]
struct IdentityTotals {
    posts: KindTotals,
    stories: KindTotals,
}

/// Buffer-and-flush stage accumulating per-identity engagement rollups.
pub struct RollupStage {
    identities: Arc<IdentityRepository>,
    media: Arc<MediaRepository>,
    events: Arc<dyn EventPublisher>,
    policy: SyncPolicy,
    totals: HashMap<IdentityId, IdentityTotals>,
}

impl RollupStage {
    /// Create the stage.
    #[must_use]
    pub fn new(
        identities: Arc<IdentityRepository>,
        media: Arc<MediaRepository>,
        events: Arc<dyn EventPublisher>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            identities,
            media,
            events,
            policy,
            totals: HashMap::new(),
        }
    }
}

#[async_trait]
impl StatStage for RollupStage {
    fn name(&self) -> &'static str {
        "rollup"
    }

    async fn process(&mut self, envelope: &mut StatEnvelope) -> SyncResult<StageAction> {
        let totals = self.totals.entry(envelope.stat.identity_id).or_default();
        if envelope.is_story() {
            totals.stories.add(&envelope.stat);
        } else {
            totals.posts.add(&envelope.stat);
        }
        Ok(StageAction::Keep)
    }

    async fn finish(&mut self) -> SyncResult<()> {
        let now = Utc::now();
        for (identity_id, totals) in std::mem::take(&mut self.totals) {
            let mut metrics = BTreeMap::new();
            if totals.posts.count > 0 {
                totals.posts.write_metrics("post", &mut metrics);
            }
            if totals.stories.count > 0 {
                totals.stories.write_metrics("story", &mut metrics);

                let since = now - self.policy.story_lookback();
                let recent = self.media.recent_stories(identity_id, since).await?;
                metrics.insert("story_recent_count".to_string(), recent.len() as f64);
            }
            if metrics.is_empty() {
                continue;
            }

            let result = self
                .identities
                .modify(identity_id, move |identity| {
                    for (name, value) in &metrics {
                        identity.metrics.insert(name.clone(), *value);
                    }
                })
                .await;
            match result {
                Ok(_) => {
                    debug!(identity_id = %identity_id, "Wrote engagement rollup");
                    self.events
                        .publish(SyncEvent::CacheInvalidate { identity_id })
                        .await;
                }
                // The identity can disappear mid-batch (losing side of a
                // conversion); its rollup is simply dropped.
                Err(StoreError::NotFound { .. }) => {
                    warn!(identity_id = %identity_id, "Rollup target vanished; skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
