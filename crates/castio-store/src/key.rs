//! Storage key scheme.
//!
//! Rows are addressed by (partition id, edge key):
//! - identity rows: partition = internal identity id, edge = `self`
//! - media rows: partition = owning identity id, edge = `media#` + a
//!   sequence derived from the platform post time plus a short content hash
//! - stat rows: partition = media id, edge = `stat#<period>#<end-time>`
//! - reverse lookup maps: partition = `extmap#`/`mediamap#` + a hash of
//!   (platform, external id), edge = `map`
//!
//! External ids never appear raw in partition keys; they are hashed so that
//! lookups by external id stay point reads regardless of id shape.

use castio_core::types::{PlatformKind, StatPeriod};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Edge key of an identity's own row.
pub const SELF_EDGE: &str = "self";

/// Edge key of a reverse-lookup map row.
pub const MAP_EDGE: &str = "map";

/// Edge-key prefix for media rows under an identity partition.
pub const MEDIA_EDGE_PREFIX: &str = "media#";

/// Edge-key prefix for stat rows under a media partition.
pub const STAT_EDGE_PREFIX: &str = "stat#";

/// External-id prefix that marks soft-linked placeholder identities.
///
/// Placeholders have no platform-issued account id; their synthetic id is
/// this prefix plus the lowercased username, which is also what the
/// up-conversion lookup keys on.
pub const SOFT_LINK_EXTERNAL_PREFIX: &str = "soft#";

fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Partition id of the identity reverse-lookup map row for an external
/// account id.
#[must_use]
pub fn external_map_partition(platform: PlatformKind, external_id: &str) -> String {
    format!(
        "extmap#{}",
        hash_hex(&format!("{}|{}", platform.as_str(), external_id))
    )
}

/// Partition id of the media reverse-lookup map row for an external media id.
#[must_use]
pub fn media_map_partition(platform: PlatformKind, external_media_id: &str) -> String {
    format!(
        "mediamap#{}",
        hash_hex(&format!("{}|{}", platform.as_str(), external_media_id))
    )
}

/// Edge key of a media row.
///
/// Ordered by platform post time so prefix scans return media in
/// chronological order; the short hash suffix disambiguates items posted in
/// the same millisecond.
#[must_use]
pub fn media_edge(posted_at: DateTime<Utc>, external_media_id: &str) -> String {
    let millis = posted_at.timestamp_millis().max(0);
    let suffix = &hash_hex(external_media_id)[..12];
    format!("{MEDIA_EDGE_PREFIX}{millis:013}#{suffix}")
}

/// Edge key of a stat row.
#[must_use]
pub fn stat_edge(period: StatPeriod, end_time: DateTime<Utc>) -> String {
    format!(
        "{STAT_EDGE_PREFIX}{}#{}",
        period.as_str(),
        end_time.timestamp()
    )
}

/// Synthetic external id of a soft-linked placeholder for a username.
#[must_use]
pub fn soft_link_external_id(username: &str) -> String {
    format!("{SOFT_LINK_EXTERNAL_PREFIX}{}", username.to_lowercase())
}

/// Whether an external id denotes a soft-linked placeholder.
#[must_use]
pub fn is_soft_link_external_id(external_id: &str) -> bool {
    external_id.starts_with(SOFT_LINK_EXTERNAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_external_map_partition_is_stable_and_distinct() {
        let a = external_map_partition(PlatformKind::Instagram, "1784");
        let b = external_map_partition(PlatformKind::Instagram, "1784");
        let c = external_map_partition(PlatformKind::Facebook, "1784");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("extmap#"));
    }

    #[test]
    fn test_media_edge_orders_by_post_time() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let a = media_edge(earlier, "m1");
        let b = media_edge(later, "m1");
        assert!(a < b);
        assert!(a.starts_with(MEDIA_EDGE_PREFIX));
    }

    #[test]
    fn test_media_edge_disambiguates_same_instant() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_ne!(media_edge(at, "m1"), media_edge(at, "m2"));
    }

    #[test]
    fn test_stat_edge_includes_period_and_end_time() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let edge = stat_edge(StatPeriod::Day, end);
        assert_eq!(edge, format!("stat#day#{}", end.timestamp()));
    }

    #[test]
    fn test_soft_link_external_id_roundtrip() {
        let id = soft_link_external_id("CreatorName");
        assert_eq!(id, "soft#creatorname");
        assert!(is_soft_link_external_id(&id));
        assert!(!is_soft_link_external_id("1784"));
    }
}
