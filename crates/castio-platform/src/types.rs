//! Wire-level records returned by platform clients.

use castio_core::types::{AccountKind, MediaKind, StatPeriod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile of an external account as the platform reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProfile {
    /// Account id issued by the platform.
    pub external_id: String,

    /// Current username.
    pub username: String,

    /// Kind of account.
    pub account_kind: AccountKind,

    /// Follower count, when the token's scope allows reading it.
    pub follower_count: Option<i64>,

    /// Total media count, when reported.
    pub media_count: Option<i64>,
}

/// One media item as the platform reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMedia {
    /// Media id issued by the platform.
    pub external_id: String,

    /// Content kind.
    pub kind: MediaKind,

    /// When the content was published.
    pub posted_at: DateTime<Utc>,

    /// Current like count.
    pub like_count: i64,

    /// Current comment count.
    pub comment_count: i64,

    /// CDN URL of the media.
    pub media_url: Option<String>,

    /// CDN URL of the thumbnail.
    pub thumbnail_url: Option<String>,
}

impl RemoteMedia {
    /// Create a media item with zeroed counters.
    #[must_use]
    pub fn new(external_id: impl Into<String>, kind: MediaKind, posted_at: DateTime<Utc>) -> Self {
        Self {
            external_id: external_id.into(),
            kind,
            posted_at,
            like_count: 0,
            comment_count: 0,
            media_url: None,
            thumbnail_url: None,
        }
    }
}

/// One named insight series for a media item or account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteInsight {
    /// Metric name as the platform reports it (e.g. `impressions`, `reach`,
    /// `engagements`, `saves`, `views`).
    pub name: String,

    /// Reporting period of the series.
    pub period: StatPeriod,

    /// Measurements, one per reporting window.
    pub values: Vec<InsightValue>,
}

impl RemoteInsight {
    /// Create a single-value insight, the common shape for lifetime metrics.
    #[must_use]
    pub fn single(
        name: impl Into<String>,
        period: StatPeriod,
        value: i64,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            period,
            values: vec![InsightValue { value, end_time }],
        }
    }
}

/// One measurement inside an insight series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightValue {
    /// The counter value.
    pub value: i64,

    /// End of the reporting window the value covers.
    pub end_time: DateTime<Utc>,
}
