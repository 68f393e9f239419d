//! Engagement rating stages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use castio_core::ids::IdentityId;
use castio_store::IdentityRepository;
use tracing::debug;

use super::{
    round6, StageAction, StatEnvelope, StatStage, STAT_ENGAGEMENTS, STAT_IMPRESSIONS, STAT_REACH,
    STAT_SAVES,
};
use crate::error::SyncResult;

/// Folds the saves counter into the platform's native engagements counter.
///
/// Runs before [`EngagementStage`]: ratings must be computed over
/// engagements-including-saves.
#[derive(Default)]
pub struct RawEngagementStage;

impl RawEngagementStage {
    /// Create the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StatStage for RawEngagementStage {
    fn name(&self) -> &'static str {
        "raw_engagement"
    }

    async fn process(&mut self, envelope: &mut StatEnvelope) -> SyncResult<StageAction> {
        let saves = envelope.stat.value(STAT_SAVES);
        if saves != 0 {
            let engagements = envelope.stat.value(STAT_ENGAGEMENTS);
            envelope.stat.set_value(STAT_ENGAGEMENTS, engagements + saves);
        }
        Ok(StageAction::Keep)
    }
}

/// Computes the engagement and true-engagement ratings.
///
/// `engagement = (engagements + impressions·[story]) / followers × 100`,
/// `true engagement = engagements / reach × 100`, both rounded to six
/// decimals and zero when the denominator is missing. Follower counts are
/// looked up once per identity per batch; identities without one are
/// remembered so the lookup is not repeated.
pub struct EngagementStage {
    identities: Arc<IdentityRepository>,
    followers: HashMap<IdentityId, Option<i64>>,
}

impl EngagementStage {
    /// Create the stage.
    #[must_use]
    pub fn new(identities: Arc<IdentityRepository>) -> Self {
        Self {
            identities,
            followers: HashMap::new(),
        }
    }

    async fn follower_count(&mut self, identity_id: IdentityId) -> SyncResult<Option<i64>> {
        if let Some(cached) = self.followers.get(&identity_id) {
            return Ok(*cached);
        }
        let count = self
            .identities
            .get_active(identity_id)
            .await?
            .and_then(|i| i.follower_count);
        if count.is_none() {
            debug!(identity_id = %identity_id, "No follower count; ratings zeroed for batch");
        }
        self.followers.insert(identity_id, count);
        Ok(count)
    }
}

#[async_trait]
impl StatStage for EngagementStage {
    fn name(&self) -> &'static str {
        "engagement"
    }

    async fn process(&mut self, envelope: &mut StatEnvelope) -> SyncResult<StageAction> {
        let followers = self.follower_count(envelope.stat.identity_id).await?;

        let engagements = envelope.stat.value(STAT_ENGAGEMENTS) as f64;
        let impressions = envelope.stat.value(STAT_IMPRESSIONS) as f64;
        let reach = envelope.stat.value(STAT_REACH) as f64;

        let base = if envelope.is_story() {
            engagements + impressions
        } else {
            engagements
        };

        let engagement_rating = match followers {
            Some(f) if f > 0 => round6(base / f as f64 * 100.0),
            _ => 0.0,
        };
        let true_engagement_rating = if reach > 0.0 {
            round6(engagements / reach * 100.0)
        } else {
            0.0
        };

        envelope.stat.engagement_rating = Some(engagement_rating);
        envelope.stat.true_engagement_rating = Some(true_engagement_rating);
        Ok(StageAction::Keep)
    }
}
