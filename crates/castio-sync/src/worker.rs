//! Background sync worker.
//!
//! Runs accounts concurrently while keeping each account's steps strictly
//! sequential (the orchestrator owns per-account ordering). Concurrency is
//! bounded per external platform to respect rate limits, every remote-bound
//! run first takes a token from the platform's bucket, and a wall-clock
//! budget abandons runs that drag — records persisted before the cutoff
//! remain individually consistent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use castio_core::ids::IdentityId;
use castio_core::types::PlatformKind;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::events::{sync_job_id, EventPublisher};
use crate::orchestrator::{MediaSyncOrchestrator, SyncRunReport};
use crate::rate_limiter::PlatformRateLimiter;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent runs allowed per external platform.
    pub per_platform_concurrency: usize,

    /// Platform API calls per minute, per platform.
    pub calls_per_minute: u64,

    /// Wall-clock budget for one account's run, in seconds.
    pub run_budget_secs: u64,

    /// Interval registered for recurring per-account schedules, in seconds.
    pub schedule_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            per_platform_concurrency: 4,
            calls_per_minute: 200,
            run_budget_secs: 900,
            schedule_interval_secs: 3600,
        }
    }
}

/// Executes sync runs with bounded per-platform concurrency.
pub struct SyncWorker {
    orchestrator: Arc<MediaSyncOrchestrator>,
    events: Arc<dyn EventPublisher>,
    config: WorkerConfig,
    permits: HashMap<PlatformKind, Arc<Semaphore>>,
    limiter: Arc<PlatformRateLimiter>,
    shutdown: Arc<AtomicBool>,
}

impl SyncWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        orchestrator: Arc<MediaSyncOrchestrator>,
        events: Arc<dyn EventPublisher>,
        config: WorkerConfig,
    ) -> Self {
        let permits = PlatformKind::ALL
            .iter()
            .map(|p| {
                (
                    *p,
                    Arc::new(Semaphore::new(config.per_platform_concurrency)),
                )
            })
            .collect();
        let limiter = Arc::new(PlatformRateLimiter::new(config.calls_per_minute));
        Self {
            orchestrator,
            events,
            config,
            permits,
            limiter,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request graceful shutdown: in-flight runs finish, new ones are
    /// refused.
    pub fn shutdown(&self) {
        info!("Sync worker shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Register the recurring schedule for an account under its stable job
    /// id.
    pub async fn register_schedule(&self, identity_id: IdentityId) {
        self.events
            .register_schedule(&sync_job_id(identity_id), self.config.schedule_interval_secs)
            .await;
    }

    /// Run one account under the platform's concurrency bound, rate budget
    /// and wall-clock budget.
    #[instrument(skip(self), fields(identity_id = %identity_id, platform = %platform))]
    pub async fn sync_account(
        &self,
        identity_id: IdentityId,
        platform: PlatformKind,
    ) -> SyncResult<SyncRunReport> {
        if self.is_shutdown() {
            return Err(SyncError::ShuttingDown);
        }

        let semaphore = self
            .permits
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| Arc::new(Semaphore::new(1)));
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        self.limiter.acquire(platform).await;

        let budget = Duration::from_secs(self.config.run_budget_secs);
        match tokio::time::timeout(budget, self.orchestrator.run(identity_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Sync run exceeded its budget; abandoning");
                Err(SyncError::BudgetExceeded {
                    budget_secs: self.config.run_budget_secs,
                })
            }
        }
    }

    /// Run a batch of accounts concurrently. Per-account results come back
    /// in completion order; a failed run never affects its siblings.
    pub async fn run_batch(
        self: &Arc<Self>,
        jobs: Vec<(IdentityId, PlatformKind)>,
    ) -> Vec<(IdentityId, SyncResult<SyncRunReport>)> {
        let mut tasks = JoinSet::new();
        for (identity_id, platform) in jobs {
            let worker = Arc::clone(self);
            tasks.spawn(async move {
                let result = worker.sync_account(identity_id, platform).await;
                (identity_id, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(e) => error!(error = %e, "Sync task panicked"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.per_platform_concurrency, 4);
        assert_eq!(config.run_budget_secs, 900);
        assert_eq!(config.schedule_interval_secs, 3600);
    }
}
