//! Per-account sync orchestration.
//!
//! Drives one account through the sync state machine:
//! `Idle → ProfileSync → ContentSync(posts, stories) → InsightSync(per-media,
//! daily, lifetime) → Reconciled`. Every remote step runs through the
//! backoff executor, so a permission failure on one step leaves the others
//! running and the run ends `PartiallyFailed` instead of aborting. A generic
//! platform error aborts the account's run; bookkeeping accumulated up to
//! that point is still persisted.

use std::sync::Arc;

use castio_core::ids::{IdentityId, SyncRunId};
use castio_core::types::MediaKind;
use castio_platform::{PlatformClient, PlatformRegistry, RemoteInsight, TokenCipher};
use castio_store::{
    IdentityRepository, MediaRecord, MediaRepository, PublisherIdentity, StatRepository,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::events::{EventPublisher, SyncEvent};
use crate::policy::SyncPolicy;
use crate::reconcile::{MediaReconciler, ReconcileReport};
use crate::stats::{StatDecorationPipeline, StatEnvelope};
use crate::steps::{
    StepOutcome, SyncStepExecutor, STEP_DAILY_INSIGHTS, STEP_FETCH_POSTS, STEP_FETCH_STORIES,
    STEP_LIFETIME_INSIGHTS, STEP_MEDIA_INSIGHTS, STEP_PROFILE,
};

/// Where a sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not started.
    Idle,
    /// Profile fetch and identity refresh.
    ProfileSync,
    /// Post and story reconciliation.
    ContentSync,
    /// Per-media and account-level insight collection.
    InsightSync,
    /// Finished with every step clean.
    Reconciled,
    /// Finished, but at least one step failed or is parked.
    PartiallyFailed,
}

/// Summary of one orchestrated run.
#[derive(Debug)]
pub struct SyncRunReport {
    /// The run.
    pub run_id: SyncRunId,

    /// The synced account.
    pub identity_id: IdentityId,

    /// Final phase: [`SyncPhase::Reconciled`] or
    /// [`SyncPhase::PartiallyFailed`].
    pub phase: SyncPhase,

    /// Post records written.
    pub posts_written: usize,

    /// Story records written.
    pub stories_written: usize,

    /// Media items seen for the first time.
    pub media_discovered: usize,

    /// Stat snapshots written after decoration.
    pub stats_written: usize,

    /// Expired media and stat rows purged.
    pub purged_rows: u64,

    /// Steps skipped by backoff state.
    pub skipped_steps: Vec<String>,

    /// Steps that ran and failed permission-class.
    pub failed_steps: Vec<String>,
}

impl SyncRunReport {
    /// Whether any step failed or was skipped.
    #[must_use]
    pub fn partial(&self) -> bool {
        !self.failed_steps.is_empty() || !self.skipped_steps.is_empty()
    }
}

/// Coordinates one account's sync run end to end.
pub struct MediaSyncOrchestrator {
    identities: Arc<IdentityRepository>,
    media: Arc<MediaRepository>,
    stats: Arc<StatRepository>,
    registry: Arc<PlatformRegistry>,
    reconciler: MediaReconciler,
    executor: SyncStepExecutor,
    cipher: TokenCipher,
    events: Arc<dyn EventPublisher>,
    policy: SyncPolicy,
}

impl MediaSyncOrchestrator {
    /// Assemble an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        identities: Arc<IdentityRepository>,
        media: Arc<MediaRepository>,
        stats: Arc<StatRepository>,
        registry: Arc<PlatformRegistry>,
        cipher: TokenCipher,
        events: Arc<dyn EventPublisher>,
        policy: SyncPolicy,
    ) -> Self {
        let reconciler = MediaReconciler::new(
            Arc::clone(&media),
            Arc::clone(&events),
            policy.clone(),
        );
        let executor = SyncStepExecutor::new(policy.clone(), Arc::clone(&events));
        Self {
            identities,
            media,
            stats,
            registry,
            reconciler,
            executor,
            cipher,
            events,
            policy,
        }
    }

    /// Run a full sync for one account.
    #[instrument(skip(self), fields(identity_id = %identity_id))]
    pub async fn run(&self, identity_id: IdentityId) -> SyncResult<SyncRunReport> {
        let Some(mut identity) = self.identities.get_active(identity_id).await? else {
            return Err(SyncError::IdentityNotFound { id: identity_id });
        };

        let run_id = SyncRunId::new();
        let result = self.run_phases(run_id, &mut identity).await;

        // Whatever happened, the failure bookkeeping accumulated so far
        // belongs in storage.
        if let Err(persist_err) = self.persist(&mut identity).await {
            warn!(error = %persist_err, "Failed to persist sync bookkeeping");
            result?;
            return Err(persist_err);
        }

        let report = result?;
        self.events
            .publish(SyncEvent::RunCompleted {
                identity_id,
                run_id,
                partial: report.partial(),
            })
            .await;
        info!(
            phase = ?report.phase,
            posts_written = report.posts_written,
            stories_written = report.stories_written,
            stats_written = report.stats_written,
            "Sync run finished"
        );
        Ok(report)
    }

    async fn run_phases(
        &self,
        run_id: SyncRunId,
        identity: &mut PublisherIdentity,
    ) -> SyncResult<SyncRunReport> {
        let now = Utc::now();
        let client = self.registry.client(identity.platform)?;
        let blob = identity
            .encrypted_token
            .clone()
            .ok_or(SyncError::MissingToken { id: identity.id })?;
        let token = self.cipher.decrypt_token(identity.id, &blob)?;
        let external_id = identity.external_id.clone();

        let mut skipped_steps = Vec::new();
        let mut failed_steps = Vec::new();
        let mut note = |step: &str, outcome: &StepOutcome<()>| match outcome {
            StepOutcome::Skipped(_) => skipped_steps.push(step.to_string()),
            StepOutcome::Failed { .. } => failed_steps.push(step.to_string()),
            StepOutcome::Ran(()) => {}
        };

        // Profile sync. Identity must be known before content sync means
        // anything, so a generic failure here aborts via `?`.
        let honor_cache = identity.last_profile_sync_at.is_some();
        let profile_outcome = {
            let client = Arc::clone(&client);
            let token = token.clone();
            let external_id = external_id.clone();
            self.executor
                .run_step(identity, STEP_PROFILE, move || async move {
                    client
                        .fetch_profile(&token, &external_id, honor_cache)
                        .await
                        .map_err(SyncError::from)
                })
                .await?
        };
        match &profile_outcome {
            StepOutcome::Ran(Some(profile)) => {
                identity.username = profile.username.clone();
                identity.account_kind = profile.account_kind;
                if profile.follower_count.is_some() {
                    identity.follower_count = profile.follower_count;
                }
                identity.last_profile_sync_at = Some(now);
            }
            StepOutcome::Ran(None) => {
                debug!("Profile unchanged since last sync");
                identity.last_profile_sync_at = Some(now);
            }
            _ => {}
        }
        note(STEP_PROFILE, &map_outcome(&profile_outcome));
        self.persist(identity).await?;

        // Content sync: posts and stories, each with its own backoff state.
        let since = identity.last_media_sync_at.map(|t| t.to_rfc3339());
        let posts = self
            .content_step(identity, STEP_FETCH_POSTS, MediaKind::Post, &client, &token, since.clone(), now, &mut note)
            .await?;
        let stories = self
            .content_step(identity, STEP_FETCH_STORIES, MediaKind::Story, &client, &token, since, now, &mut note)
            .await?;
        self.persist(identity).await?;

        // Per-media insight collection feeds the decoration pipeline.
        let mut working_set: Vec<MediaRecord> = posts.working_set.clone();
        working_set.extend(stories.working_set.iter().cloned());
        let envelopes = {
            let snapshot = identity.clone();
            let reconciler = &self.reconciler;
            let client_ref = &*client;
            let token_ref = token.as_str();
            let records = &working_set;
            let outcome = self
                .executor
                .run_step(identity, STEP_MEDIA_INSIGHTS, move || async move {
                    reconciler
                        .collect_media_stats(client_ref, token_ref, &snapshot, records, now)
                        .await
                })
                .await?;
            note(STEP_MEDIA_INSIGHTS, &map_outcome(&outcome));
            outcome.into_ran().unwrap_or_default()
        };

        // Account-level insight series land directly on the metric map.
        for (step, prefix) in [
            (STEP_DAILY_INSIGHTS, "daily"),
            (STEP_LIFETIME_INSIGHTS, "lifetime"),
        ] {
            let outcome = {
                let client = Arc::clone(&client);
                let token = token.clone();
                let external_id = external_id.clone();
                self.executor
                    .run_step(identity, step, move || async move {
                        let series = if step == STEP_DAILY_INSIGHTS {
                            client.fetch_daily_insights(&token, &external_id).await?
                        } else {
                            client.fetch_lifetime_insights(&token, &external_id).await?
                        };
                        Ok(series)
                    })
                    .await?
            };
            if let StepOutcome::Ran(series) = &outcome {
                apply_account_series(identity, prefix, series);
            }
            note(step, &map_outcome(&outcome));
        }
        self.persist(identity).await?;

        // Decoration pipeline: ratings, then rollups onto the identity.
        let stats_written = if envelopes.is_empty() {
            0
        } else {
            let pipeline = StatDecorationPipeline::standard(
                Arc::clone(&self.identities),
                Arc::clone(&self.media),
                Arc::clone(&self.stats),
                Arc::clone(&self.events),
                self.policy.clone(),
            );
            pipeline.run(envelopes).await?.written
        };

        let purged_rows = self.purge_expired(identity.id, now).await?;

        let mut report = SyncRunReport {
            run_id,
            identity_id: identity.id,
            phase: SyncPhase::Reconciled,
            posts_written: posts.written,
            stories_written: stories.written,
            media_discovered: posts.discovered + stories.discovered,
            stats_written,
            purged_rows,
            skipped_steps,
            failed_steps,
        };
        if report.partial() {
            report.phase = SyncPhase::PartiallyFailed;
        }
        Ok(report)
    }

    /// One content kind's fetch-and-reconcile, under its own step state.
    #[allow(clippy::too_many_arguments)]
    async fn content_step(
        &self,
        identity: &mut PublisherIdentity,
        step: &'static str,
        kind: MediaKind,
        client: &Arc<dyn PlatformClient>,
        token: &str,
        since: Option<String>,
        now: DateTime<Utc>,
        note: &mut impl FnMut(&str, &StepOutcome<()>),
    ) -> SyncResult<ReconcileReport> {
        let outcome = {
            let client = Arc::clone(client);
            let token = token.to_string();
            let external_id = identity.external_id.clone();
            self.executor
                .run_step(identity, step, move || async move {
                    client
                        .fetch_media(&token, &external_id, kind, since.as_deref())
                        .await
                        .map_err(SyncError::from)
                })
                .await?
        };
        note(step, &map_outcome(&outcome));

        let ran = outcome.is_ran();
        // A skipped or failed fetch still yields the stored records as the
        // working set, exactly like an unchanged conditional fetch.
        let remote = match outcome {
            StepOutcome::Ran(remote) => remote,
            _ => Vec::new(),
        };
        let report = self.reconciler.reconcile(identity, kind, remote, now).await?;
        if ran && kind == MediaKind::Post {
            identity.last_media_sync_at = Some(now);
        }
        Ok(report)
    }

    /// Save the identity, merging over a concurrent writer when the
    /// optimistic write collides (the rollup stage writes metrics through
    /// its own path).
    async fn persist(&self, identity: &mut PublisherIdentity) -> SyncResult<()> {
        match self.identities.save(identity).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                let local = identity.clone();
                let merged = self
                    .identities
                    .modify(local.id, move |fresh| {
                        fresh.username = local.username.clone();
                        fresh.account_kind = local.account_kind;
                        fresh.link_state = local.link_state;
                        fresh.follower_count = local.follower_count;
                        fresh.last_profile_sync_at = local.last_profile_sync_at;
                        fresh.last_media_sync_at = local.last_media_sync_at;
                        fresh.step_states = local.step_states.clone();
                        for (name, value) in &local.metrics {
                            fresh.metrics.insert(name.clone(), *value);
                        }
                    })
                    .await?;
                *identity = merged;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Purge expired media and stat rows; completion media is exempt.
    async fn purge_expired(&self, identity_id: IdentityId, now: DateTime<Utc>) -> SyncResult<u64> {
        let all = self
            .media
            .list_for_identity(identity_id, None, true, now)
            .await?;
        let mut purged = 0;
        for record in &all {
            purged += self.stats.purge_expired(record.id, now).await?;
        }
        purged += self.media.purge_expired(identity_id, now).await?;
        if purged > 0 {
            debug!(purged, "Purged expired rows");
        }
        Ok(purged)
    }
}

/// Collapse an outcome to unit so the step-note closure takes one shape.
fn map_outcome<T>(outcome: &StepOutcome<T>) -> StepOutcome<()> {
    match outcome {
        StepOutcome::Ran(_) => StepOutcome::Ran(()),
        StepOutcome::Skipped(reason) => StepOutcome::Skipped(*reason),
        StepOutcome::Failed { code, message } => StepOutcome::Failed {
            code: *code,
            message: message.clone(),
        },
    }
}

/// Write the latest value of each account-level series onto the metric map.
fn apply_account_series(identity: &mut PublisherIdentity, prefix: &str, series: &[RemoteInsight]) {
    for insight in series {
        if let Some(latest) = insight.values.last() {
            identity
                .metrics
                .insert(format!("{prefix}_{}", insight.name), latest.value as f64);
        }
    }
}
