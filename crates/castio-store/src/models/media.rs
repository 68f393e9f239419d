//! Media records.
//!
//! One row per piece of published content (post or story) owned by a
//! publisher identity, unique per (identity, external media id). Media
//! expires on a rolling window and becomes eligible for purge, except
//! completion media — content tied to proof of completion of a marketplace
//! transaction — which is pinned forever.

use castio_core::ids::{IdentityId, MediaId};
use castio_core::types::MediaKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One piece of published content owned by a publisher identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Internal id.
    pub id: MediaId,

    /// Owning identity.
    pub identity_id: IdentityId,

    /// Media id issued by the platform.
    pub external_id: String,

    /// Content kind.
    pub kind: MediaKind,

    /// When the content was published on the platform.
    pub posted_at: DateTime<Utc>,

    /// Like count at last sync.
    pub like_count: i64,

    /// Comment count at last sync.
    pub comment_count: i64,

    /// CDN URL of the media itself.
    pub media_url: Option<String>,

    /// CDN URL of the thumbnail.
    pub thumbnail_url: Option<String>,

    /// Completion media is pinned: exempt from expiry, and its URLs are only
    /// re-fetched once they age out.
    pub completion: bool,

    /// Consecutive failures reporting that this content predates the
    /// account's business conversion. Capped; once capped the item is
    /// permanently skipped.
    pub preconversion_errors: i32,

    /// When the URLs were last refreshed from the platform.
    pub urls_updated_at: DateTime<Utc>,

    /// When this record was last written by a sync run.
    pub last_synced_at: DateTime<Utc>,

    /// Rolling-window expiry; `None` for completion media.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp; doubles as the optimistic-write version.
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// Create a record for newly discovered content.
    #[must_use]
    pub fn new(
        identity_id: IdentityId,
        external_id: impl Into<String>,
        kind: MediaKind,
        posted_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MediaId::new(),
            identity_id,
            external_id: external_id.into(),
            kind,
            posted_at,
            like_count: 0,
            comment_count: 0,
            media_url: None,
            thumbnail_url: None,
            completion: false,
            preconversion_errors: 0,
            urls_updated_at: now,
            last_synced_at: now,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the record has passed its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the content falls inside the retention window.
    #[must_use]
    pub fn is_in_window(&self, retention_days: i64, now: DateTime<Utc>) -> bool {
        self.posted_at >= now - Duration::days(retention_days)
    }

    /// Whether a sync pass should overwrite the stored URLs.
    ///
    /// Pinned (completion) media keeps its URLs until they age past the
    /// refresh window; everything else is refreshed on every pass.
    #[must_use]
    pub fn should_refresh_urls(&self, refresh_days: i64, now: DateTime<Utc>) -> bool {
        !self.completion || self.urls_updated_at <= now - Duration::days(refresh_days)
    }

    /// Pin this record as completion media; it no longer expires.
    pub fn mark_completion(&mut self) {
        self.completion = true;
        self.expires_at = None;
        self.updated_at = Utc::now();
    }

    /// Count one more pre-conversion error. Returns the new count.
    pub fn record_preconversion_error(&mut self, now: DateTime<Utc>) -> i32 {
        self.preconversion_errors += 1;
        self.updated_at = now;
        self.preconversion_errors
    }

    /// Whether pre-conversion errors have reached the permanent-skip cap.
    #[must_use]
    pub fn is_preconversion_capped(&self, cap: i32) -> bool {
        self.preconversion_errors >= cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MediaRecord {
        MediaRecord::new(IdentityId::new(), "m-1", MediaKind::Post, Utc::now())
    }

    #[test]
    fn test_new_record_has_no_expiry() {
        let record = record();
        assert!(record.expires_at.is_none());
        assert!(!record.is_expired(Utc::now()));
        assert_eq!(record.preconversion_errors, 0);
    }

    #[test]
    fn test_expiry() {
        let mut record = record();
        let now = Utc::now();
        record.expires_at = Some(now - Duration::hours(1));
        assert!(record.is_expired(now));

        record.expires_at = Some(now + Duration::hours(1));
        assert!(!record.is_expired(now));
    }

    #[test]
    fn test_completion_media_never_expires() {
        let mut record = record();
        record.expires_at = Some(Utc::now() - Duration::hours(1));
        record.mark_completion();
        assert!(record.completion);
        assert!(record.expires_at.is_none());
        assert!(!record.is_expired(Utc::now()));
    }

    #[test]
    fn test_retention_window() {
        let now = Utc::now();
        let mut record = record();

        record.posted_at = now - Duration::days(10);
        assert!(record.is_in_window(30, now));

        record.posted_at = now - Duration::days(45);
        assert!(!record.is_in_window(30, now));
    }

    #[test]
    fn test_url_refresh_policy() {
        let now = Utc::now();
        let mut record = record();

        // Regular media refreshes every pass.
        assert!(record.should_refresh_urls(20, now));

        // Pinned media with fresh URLs keeps them.
        record.completion = true;
        record.urls_updated_at = now - Duration::days(5);
        assert!(!record.should_refresh_urls(20, now));

        // Pinned media with stale URLs refreshes.
        record.urls_updated_at = now - Duration::days(25);
        assert!(record.should_refresh_urls(20, now));
    }

    #[test]
    fn test_preconversion_error_cap() {
        let mut record = record();
        let now = Utc::now();
        for _ in 0..15 {
            record.record_preconversion_error(now);
        }
        assert!(record.is_preconversion_capped(15));
        assert!(!record.is_preconversion_capped(16));
    }

    #[test]
    fn test_serde_roundtrip() {
        let record = record();
        let json = serde_json::to_string(&record).unwrap();
        let back: MediaRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
