//! Publisher identities.
//!
//! A publisher identity is the internal record of a creator or business
//! account on one external platform. It carries the linkage state, the
//! per-step sync failure bookkeeping, and the rolled-up engagement metrics.
//! Exactly one non-deleted identity exists per (platform, external id) pair;
//! the internal id survives link-state conversions.

use std::collections::{BTreeMap, HashMap};

use castio_core::ids::IdentityId;
use castio_core::types::{AccountKind, LinkState, PlatformKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::key;

/// Backoff bookkeeping for one named sync step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    /// When the step last failed.
    pub last_failed_at: DateTime<Utc>,

    /// Consecutive failures since the last success or token change.
    pub consecutive_failures: i32,
}

/// A creator or business account on one external platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherIdentity {
    /// Internal id; stable, never reused, survives conversions.
    pub id: IdentityId,

    /// Platform the account lives on.
    pub platform: PlatformKind,

    /// Account id issued by the platform. Soft-linked placeholders carry a
    /// synthetic id with a reserved prefix instead.
    pub external_id: String,

    /// Equivalent account id on the counterpart platform, when known.
    pub alternate_external_id: Option<String>,

    /// Platform username at last sync.
    pub username: String,

    /// Kind of account behind the identity.
    pub account_kind: AccountKind,

    /// Current linkage state.
    pub link_state: LinkState,

    /// Follower count at last profile sync.
    pub follower_count: Option<i64>,

    /// Access token, encrypted before it ever reaches storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_token: Option<Vec<u8>>,

    /// When the access token last changed. A token change invalidates all
    /// prior step-failure history.
    pub token_updated_at: Option<DateTime<Utc>>,

    /// When the profile was last successfully synced.
    pub last_profile_sync_at: Option<DateTime<Utc>>,

    /// When media was last successfully synced.
    pub last_media_sync_at: Option<DateTime<Utc>>,

    /// Per-step failure map, keyed by step name.
    #[serde(default)]
    pub step_states: HashMap<String, StepState>,

    /// Rolled-up engagement metrics written by the stat pipeline.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Soft-delete marker.
    pub deleted: bool,

    /// When the identity was created.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp; doubles as the optimistic-write version the
    /// repository read the row at.
    pub updated_at: DateTime<Utc>,
}

impl PublisherIdentity {
    /// Create an identity for a real platform connection.
    #[must_use]
    pub fn new_connected(
        platform: PlatformKind,
        external_id: impl Into<String>,
        username: impl Into<String>,
        account_kind: AccountKind,
        link_state: LinkState,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::new(),
            platform,
            external_id: external_id.into(),
            alternate_external_id: None,
            username: username.into(),
            account_kind,
            link_state,
            follower_count: None,
            encrypted_token: None,
            token_updated_at: None,
            last_profile_sync_at: None,
            last_media_sync_at: None,
            step_states: HashMap::new(),
            metrics: BTreeMap::new(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a soft-linked placeholder for an account that is referenced
    /// but not yet connected. Its synthetic external id is derived from the
    /// username so the up-conversion lookup can find it later.
    #[must_use]
    pub fn new_soft_linked(
        platform: PlatformKind,
        username: impl Into<String>,
        account_kind: AccountKind,
    ) -> Self {
        let username = username.into();
        Self::new_connected(
            platform,
            key::soft_link_external_id(&username),
            username,
            account_kind,
            LinkState::SoftLinked,
        )
    }

    /// Whether this identity is a soft-linked placeholder.
    #[must_use]
    pub fn is_soft_linked(&self) -> bool {
        self.link_state == LinkState::SoftLinked
    }

    /// Whether both profile and media sync are older than the given
    /// threshold (never-synced counts as stale).
    #[must_use]
    pub fn is_sync_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        let cutoff = now - threshold;
        let profile_stale = self.last_profile_sync_at.is_none_or(|t| t <= cutoff);
        let media_stale = self.last_media_sync_at.is_none_or(|t| t <= cutoff);
        profile_stale && media_stale
    }

    /// Backoff state for a step, if any failure is recorded.
    #[must_use]
    pub fn step_state(&self, step: &str) -> Option<&StepState> {
        self.step_states.get(step)
    }

    /// Record one more failure for a step.
    pub fn record_step_failure(&mut self, step: &str, now: DateTime<Utc>) {
        let entry = self.step_states.entry(step.to_string()).or_insert(StepState {
            last_failed_at: now,
            consecutive_failures: 0,
        });
        entry.last_failed_at = now;
        entry.consecutive_failures += 1;
        self.updated_at = now;
    }

    /// Clear a step's failure history after a successful run.
    pub fn clear_step_failures(&mut self, step: &str) {
        if self.step_states.remove(step).is_some() {
            self.updated_at = Utc::now();
        }
    }

    /// Install a freshly encrypted token, invalidating prior backoff state.
    pub fn set_encrypted_token(&mut self, token: Vec<u8>, now: DateTime<Utc>) {
        self.encrypted_token = Some(token);
        self.token_updated_at = Some(now);
        self.updated_at = now;
    }
}
