//! Media stat snapshots.
//!
//! One row per (media, period, end time): the raw named counters the
//! platform reported plus the ratings computed by the decoration pipeline.
//! Snapshots are only rewritten when their content actually changed, so
//! high-frequency polling does not churn storage.

use std::collections::BTreeMap;

use castio_core::ids::{IdentityId, MediaId};
use castio_core::types::StatPeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One measurement snapshot for a media record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaStatRecord {
    /// The measured media.
    pub media_id: MediaId,

    /// The identity owning the media.
    pub identity_id: IdentityId,

    /// Reporting period.
    pub period: StatPeriod,

    /// End of the reporting window.
    pub end_time: DateTime<Utc>,

    /// Raw named counters as reported by the platform.
    #[serde(default)]
    pub values: BTreeMap<String, i64>,

    /// Engagement rating computed by the decoration pipeline.
    pub engagement_rating: Option<f64>,

    /// True-engagement rating computed by the decoration pipeline.
    pub true_engagement_rating: Option<f64>,

    /// Rolling-window expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl MediaStatRecord {
    /// Create a snapshot with no values yet.
    #[must_use]
    pub fn new(
        media_id: MediaId,
        identity_id: IdentityId,
        period: StatPeriod,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            media_id,
            identity_id,
            period,
            end_time,
            values: BTreeMap::new(),
            engagement_rating: None,
            true_engagement_rating: None,
            expires_at: None,
        }
    }

    /// A named counter, defaulting to zero when absent.
    #[must_use]
    pub fn value(&self, name: &str) -> i64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    /// Set a named counter.
    pub fn set_value(&mut self, name: impl Into<String>, value: i64) {
        self.values.insert(name.into(), value);
    }

    /// Whether this snapshot's content differs from a stored version.
    ///
    /// Compares every named counter and both computed ratings; the expiry
    /// timestamp is bookkeeping and deliberately excluded, so a pure expiry
    /// bump never counts as a content change.
    #[must_use]
    pub fn content_differs(&self, other: &MediaStatRecord) -> bool {
        self.values != other.values
            || self.engagement_rating != other.engagement_rating
            || self.true_engagement_rating != other.true_engagement_rating
            || self.period != other.period
            || self.end_time != other.end_time
    }
}
