//! Static dispatch from platform kind to client instance.
//!
//! Assembled once at startup and threaded into the sync core; there is no
//! string-keyed dynamic resolution anywhere.

use std::collections::HashMap;
use std::sync::Arc;

use castio_core::types::PlatformKind;

use crate::client::PlatformClient;
use crate::error::{PlatformError, PlatformResult};

/// Registry of platform clients, keyed by platform kind.
#[derive(Default)]
pub struct PlatformRegistry {
    clients: HashMap<PlatformKind, Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own platform kind, replacing any
    /// previous registration.
    #[must_use]
    pub fn register(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.clients.insert(client.platform(), client);
        self
    }

    /// Resolve the client for a platform.
    pub fn client(&self, platform: PlatformKind) -> PlatformResult<Arc<dyn PlatformClient>> {
        self.clients
            .get(&platform)
            .cloned()
            .ok_or_else(|| PlatformError::Unsupported {
                platform: platform.to_string(),
            })
    }

    /// Whether a client is registered for a platform.
    #[must_use]
    pub fn supports(&self, platform: PlatformKind) -> bool {
        self.clients.contains_key(&platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RemoteInsight, RemoteMedia, RemoteProfile};
    use async_trait::async_trait;
    use castio_core::types::{MediaKind, StatPeriod};

    struct NullClient(PlatformKind);

    #[async_trait]
    impl PlatformClient for NullClient {
        fn platform(&self) -> PlatformKind {
            self.0
        }

        async fn fetch_profile(
            &self,
            _token: &str,
            _external_id: &str,
            _honor_cache: bool,
        ) -> PlatformResult<Option<RemoteProfile>> {
            Ok(None)
        }

        async fn fetch_media(
            &self,
            _token: &str,
            _external_id: &str,
            _kind: MediaKind,
            _since: Option<&str>,
        ) -> PlatformResult<Vec<RemoteMedia>> {
            Ok(Vec::new())
        }

        async fn fetch_media_insights(
            &self,
            _token: &str,
            _media_external_id: &str,
            _period: StatPeriod,
        ) -> PlatformResult<Vec<RemoteInsight>> {
            Ok(Vec::new())
        }

        async fn fetch_daily_insights(
            &self,
            _token: &str,
            _external_id: &str,
        ) -> PlatformResult<Vec<RemoteInsight>> {
            Ok(Vec::new())
        }

        async fn fetch_lifetime_insights(
            &self,
            _token: &str,
            _external_id: &str,
        ) -> PlatformResult<Vec<RemoteInsight>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = PlatformRegistry::new()
            .register(Arc::new(NullClient(PlatformKind::Instagram)))
            .register(Arc::new(NullClient(PlatformKind::Tiktok)));

        assert!(registry.supports(PlatformKind::Instagram));
        assert!(registry.supports(PlatformKind::Tiktok));
        assert!(!registry.supports(PlatformKind::Facebook));

        let client = registry.client(PlatformKind::Instagram).unwrap();
        assert_eq!(client.platform(), PlatformKind::Instagram);
    }

    #[test]
    fn test_unregistered_platform_errors() {
        let registry = PlatformRegistry::new();
        let err = registry.client(PlatformKind::Facebook).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_PLATFORM");
    }
}
