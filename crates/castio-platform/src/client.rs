//! Platform client capability trait.
//!
//! One implementation exists per external platform; the sync core resolves
//! the right one through [`crate::PlatformRegistry`] and otherwise treats
//! the platform as this capability surface. Implementations own the HTTP
//! details (pagination, conditional requests, auth headers) — none of that
//! leaks through the trait.

use async_trait::async_trait;

use castio_core::types::{MediaKind, PlatformKind, StatPeriod};

use crate::error::PlatformResult;
use crate::types::{RemoteInsight, RemoteMedia, RemoteProfile};

/// Capability surface of one external platform.
///
/// Every call takes the decrypted access token of the account being synced.
/// Calls may fail permission-class (recorded as backoff state by the
/// caller), with a content-precondition error (counted per item), or
/// generically (aborts the account's run).
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// The platform this client talks to.
    fn platform(&self) -> PlatformKind;

    /// Fetch the account's profile.
    ///
    /// With `honor_cache` set, the implementation may answer from its
    /// conditional-fetch state and return `None` when the profile has not
    /// changed since it was last read.
    async fn fetch_profile(
        &self,
        token: &str,
        external_id: &str,
        honor_cache: bool,
    ) -> PlatformResult<Option<RemoteProfile>>;

    /// Fetch the account's media of one kind.
    ///
    /// `since` is an opaque cursor from a previous fetch. An empty result
    /// with a cursor present means nothing changed (conditional-fetch
    /// semantics), not that the account has no media.
    async fn fetch_media(
        &self,
        token: &str,
        external_id: &str,
        kind: MediaKind,
        since: Option<&str>,
    ) -> PlatformResult<Vec<RemoteMedia>>;

    /// Fetch insight series for one media item.
    async fn fetch_media_insights(
        &self,
        token: &str,
        media_external_id: &str,
        period: StatPeriod,
    ) -> PlatformResult<Vec<RemoteInsight>>;

    /// Fetch the account's daily insight series.
    async fn fetch_daily_insights(
        &self,
        token: &str,
        external_id: &str,
    ) -> PlatformResult<Vec<RemoteInsight>>;

    /// Fetch the account's lifetime insight series.
    async fn fetch_lifetime_insights(
        &self,
        token: &str,
        external_id: &str,
    ) -> PlatformResult<Vec<RemoteInsight>>;
}
