//! Sync event publishing.
//!
//! The sync core emits fire-and-forget events for downstream consumers
//! (media feeds, cache invalidation, failure dashboards) and registers
//! recurring sync schedules keyed by a stable per-account job id. No caller
//! waits on either; publish failures are the publisher's problem to log.

use std::sync::Mutex;

use async_trait::async_trait;
use castio_core::ids::{IdentityId, MediaId, SyncRunId};
use castio_core::types::MediaKind;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Events emitted by the sync core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A media item was seen for the first time.
    MediaReceived {
        /// Owning identity.
        identity_id: IdentityId,
        /// Internal id of the new record.
        media_id: MediaId,
        /// Platform media id.
        external_id: String,
        /// Content kind.
        kind: MediaKind,
    },

    /// Aggregate metrics on an identity changed; downstream caches keyed by
    /// the account id must drop their copies.
    CacheInvalidate {
        /// The identity whose metrics changed.
        identity_id: IdentityId,
    },

    /// A sync step failed permission-class and was recorded as backoff
    /// state.
    StepFailed {
        /// The identity being synced.
        identity_id: IdentityId,
        /// Name of the failed step.
        step: String,
        /// Error code of the failure.
        code: String,
        /// Consecutive failures now recorded for the step.
        consecutive_failures: i32,
    },

    /// A sync run finished, possibly with some steps failed or skipped.
    RunCompleted {
        /// The identity that was synced.
        identity_id: IdentityId,
        /// The run.
        run_id: SyncRunId,
        /// Whether any step failed or was skipped.
        partial: bool,
    },
}

/// Fire-and-forget event sink plus recurring-schedule registration.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Emit an event. Implementations must not fail the caller; delivery
    /// problems are logged and swallowed.
    async fn publish(&self, event: SyncEvent);

    /// Register (or refresh) a recurring schedule under a stable job id.
    async fn register_schedule(&self, job_id: &str, interval_secs: u64);
}

/// Publisher that writes events to the tracing log. The default sink when
/// no queue integration is wired in.
#[derive(Default)]
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    /// Create a tracing-backed publisher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: SyncEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = %payload, "Sync event"),
            Err(e) => info!(error = %e, "Sync event (unserializable)"),
        }
    }

    async fn register_schedule(&self, job_id: &str, interval_secs: u64) {
        info!(job_id, interval_secs, "Registered sync schedule");
    }
}

/// In-memory publisher capturing everything it is given; test support.
#[derive(Default)]
pub struct CapturingEventPublisher {
    events: Mutex<Vec<SyncEvent>>,
    schedules: Mutex<Vec<(String, u64)>>,
}

impl CapturingEventPublisher {
    /// Create an empty capturing publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    #[must_use]
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }

    /// Registered schedules so far.
    #[must_use]
    pub fn schedules(&self) -> Vec<(String, u64)> {
        self.schedules.lock().expect("event lock poisoned").clone()
    }

    /// Drain captured events.
    #[must_use]
    pub fn take(&self) -> Vec<SyncEvent> {
        std::mem::take(&mut *self.events.lock().expect("event lock poisoned"))
    }
}

#[async_trait]
impl EventPublisher for CapturingEventPublisher {
    async fn publish(&self, event: SyncEvent) {
        self.events.lock().expect("event lock poisoned").push(event);
    }

    async fn register_schedule(&self, job_id: &str, interval_secs: u64) {
        self.schedules
            .lock()
            .expect("event lock poisoned")
            .push((job_id.to_string(), interval_secs));
    }
}

/// Stable job id for an account's recurring sync schedule.
#[must_use]
pub fn sync_job_id(identity_id: IdentityId) -> String {
    format!("media-sync-{identity_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capturing_publisher_records_in_order() {
        let publisher = CapturingEventPublisher::new();
        let id = IdentityId::new();

        publisher
            .publish(SyncEvent::CacheInvalidate { identity_id: id })
            .await;
        publisher
            .publish(SyncEvent::RunCompleted {
                identity_id: id,
                run_id: SyncRunId::new(),
                partial: false,
            })
            .await;

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SyncEvent::CacheInvalidate { .. }));

        let drained = publisher.take();
        assert_eq!(drained.len(), 2);
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_registration_is_captured() {
        let publisher = CapturingEventPublisher::new();
        let id = IdentityId::new();
        publisher.register_schedule(&sync_job_id(id), 3600).await;

        let schedules = publisher.schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].0, format!("media-sync-{id}"));
        assert_eq!(schedules[0].1, 3600);
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = SyncEvent::CacheInvalidate {
            identity_id: IdentityId::new(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"cache_invalidate\""));
    }
}
