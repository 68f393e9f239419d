//! # Castio Sync
//!
//! Publisher-identity resolution and media synchronization, the core
//! subsystem of the castio marketplace backend:
//! - [`AccountLinkResolver`]: reconciles incoming external connections
//!   against existing identities — absorb, up-convert, down-convert or
//!   create, always preserving the surviving internal id
//! - [`SyncStepExecutor`]: per-account, per-step adaptive backoff around
//!   every remote fetch
//! - [`MediaReconciler`]: diffs remote media against stored records and
//!   persists only what changed
//! - [`StatDecorationPipeline`]: ordered enrichment stages over freshly
//!   fetched stat snapshots (raw folding, ratings, aggregate rollup)
//! - [`MediaSyncOrchestrator`]: drives one account through the sync state
//!   machine
//! - [`SyncWorker`]: concurrent-across-accounts execution with per-platform
//!   concurrency bounds, rate limits and a wall-clock budget
//!
//! Runs are triggered by an external scheduler; nothing here waits on a
//! synchronous caller.

pub mod error;
pub mod events;
pub mod lock;
pub mod orchestrator;
pub mod policy;
pub mod rate_limiter;
pub mod reconcile;
pub mod resolver;
pub mod stats;
pub mod steps;
pub mod worker;

pub use error::{SyncError, SyncResult};
pub use events::{CapturingEventPublisher, EventPublisher, SyncEvent, TracingEventPublisher};
pub use lock::KeyedLock;
pub use orchestrator::{MediaSyncOrchestrator, SyncPhase, SyncRunReport};
pub use policy::SyncPolicy;
pub use rate_limiter::{PlatformRateLimiter, TokenBucket};
pub use reconcile::{MediaReconciler, ReconcileReport};
pub use resolver::{AccountLinkResolver, IncomingConnection, LinkAction, LinkResolution};
pub use stats::{
    EngagementStage, PipelineReport, RawEngagementStage, RollupStage, StatDecorationPipeline,
    StatEnvelope,
};
pub use steps::{SkipReason, StepDecision, StepOutcome, SyncStepExecutor};
pub use worker::{SyncWorker, WorkerConfig};
