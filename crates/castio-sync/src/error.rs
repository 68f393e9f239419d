//! Sync error types.

use castio_core::ids::IdentityId;
use castio_platform::PlatformError;
use castio_store::StoreError;
use thiserror::Error;

/// Errors raised by the sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Platform API or token-cipher failure.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// The account to sync does not exist or is deleted.
    #[error("Publisher identity not found: {id}")]
    IdentityNotFound {
        /// The missing identity.
        id: IdentityId,
    },

    /// The account has no stored access token, so no platform call can be
    /// made on its behalf.
    #[error("Publisher identity {id} has no access token")]
    MissingToken {
        /// The tokenless identity.
        id: IdentityId,
    },

    /// The run exceeded its wall-clock budget and was abandoned. Records
    /// persisted before the cutoff remain valid.
    #[error("Sync run exceeded its {budget_secs}s budget")]
    BudgetExceeded {
        /// The budget that was exceeded.
        budget_secs: u64,
    },

    /// The worker is shutting down and no longer accepts runs.
    #[error("Sync worker is shutting down")]
    ShuttingDown,
}

impl SyncError {
    /// Whether the underlying failure is permission-class: recorded as step
    /// backoff state instead of aborting the account's run.
    #[must_use]
    pub fn is_permission_class(&self) -> bool {
        matches!(self, SyncError::Platform(e) if e.is_permission_class())
    }

    /// Error code for log fields and failure events.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Store(e) if e.is_conflict() => "CONCURRENCY_CONFLICT",
            SyncError::Store(_) => "STORE_ERROR",
            SyncError::Platform(e) => e.error_code(),
            SyncError::IdentityNotFound { .. } => "IDENTITY_NOT_FOUND",
            SyncError::MissingToken { .. } => "MISSING_TOKEN",
            SyncError::BudgetExceeded { .. } => "RUN_BUDGET_EXCEEDED",
            SyncError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
