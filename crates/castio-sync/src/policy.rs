//! Sync policy configuration.
//!
//! All numeric knobs of the sync core live here. Several of them are
//! empirically tuned values carried over from production tuning (the 3000×
//! staleness multiplier, the 7500-second backoff base); they are kept as
//! named fields rather than re-derived.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Policy constants governing resolution, backoff, reconciliation and
/// retention. Threaded explicitly into every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Normal interval between scheduled sync runs for one account, in
    /// seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: i64,

    /// Base unit of the step backoff window, in seconds. The skip window for
    /// a step with `f` consecutive failures is `⌊f/3⌋ × f` of these.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: i64,

    /// Consecutive failures after which a step is skipped permanently until
    /// the account's token changes.
    #[serde(default = "default_step_skip_cap")]
    pub step_skip_cap: i32,

    /// Multiplier on `sync_interval_secs` past which an identity with both
    /// profile and media sync stale is considered abandoned and eligible for
    /// down-conversion.
    #[serde(default = "default_stale_multiplier")]
    pub stale_multiplier: i64,

    /// Rolling retention window for media records, in days.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Age past which stored media URLs are refreshed even on pinned
    /// records, in days.
    #[serde(default = "default_url_refresh_days")]
    pub url_refresh_days: i64,

    /// Pre-conversion errors after which a media item is permanently skipped.
    #[serde(default = "default_preconversion_cap")]
    pub preconversion_cap: i32,

    /// Minimum failed insight fetches before an all-permission-denied batch
    /// is escalated to a step failure.
    #[serde(default = "default_permission_failure_threshold")]
    pub permission_failure_threshold: usize,

    /// Minimum number of media items whose insights are fetched per run even
    /// when they fall outside the retention window.
    #[serde(default = "default_min_insight_count")]
    pub min_insight_count: usize,

    /// How far back the rollup stage looks for stored stories when a story
    /// stat is observed, in hours.
    #[serde(default = "default_story_lookback_hours")]
    pub story_lookback_hours: i64,
}

fn default_sync_interval_secs() -> i64 {
    3600
}

fn default_backoff_base_secs() -> i64 {
    7500
}

fn default_step_skip_cap() -> i32 {
    16
}

fn default_stale_multiplier() -> i64 {
    3000
}

fn default_retention_days() -> i64 {
    30
}

fn default_url_refresh_days() -> i64 {
    20
}

fn default_preconversion_cap() -> i32 {
    15
}

fn default_permission_failure_threshold() -> usize {
    5
}

fn default_min_insight_count() -> usize {
    10
}

fn default_story_lookback_hours() -> i64 {
    24
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            step_skip_cap: default_step_skip_cap(),
            stale_multiplier: default_stale_multiplier(),
            retention_days: default_retention_days(),
            url_refresh_days: default_url_refresh_days(),
            preconversion_cap: default_preconversion_cap(),
            permission_failure_threshold: default_permission_failure_threshold(),
            min_insight_count: default_min_insight_count(),
            story_lookback_hours: default_story_lookback_hours(),
        }
    }
}

impl SyncPolicy {
    /// Staleness threshold for down-conversion eligibility.
    #[must_use]
    pub fn stale_threshold(&self) -> Duration {
        Duration::seconds(self.stale_multiplier * self.sync_interval_secs)
    }

    /// Rolling retention window as a duration.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::days(self.retention_days)
    }

    /// Story lookback window for the rollup stage.
    #[must_use]
    pub fn story_lookback(&self) -> Duration {
        Duration::hours(self.story_lookback_hours)
    }
}
