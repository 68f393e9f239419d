//! Store error types.

use thiserror::Error;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error while encoding or decoding a stored row.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Optimistic conditional write collided with a concurrent writer.
    ///
    /// The caller is expected to re-read the row and retry.
    #[error("Version conflict on ({partition}, {edge})")]
    Conflict {
        /// Partition id of the contested row.
        partition: String,
        /// Edge key of the contested row.
        edge: String,
    },

    /// A row that the operation requires to already exist was absent.
    ///
    /// Expected-absent reads return `Ok(None)`; this variant is reserved for
    /// updates that need prior existence.
    #[error("Row not found: ({partition}, {edge})")]
    NotFound {
        /// Partition id of the missing row.
        partition: String,
        /// Edge key of the missing row.
        edge: String,
    },
}

impl StoreError {
    /// Create a conflict error for a row key.
    pub fn conflict(partition: impl Into<String>, edge: impl Into<String>) -> Self {
        StoreError::Conflict {
            partition: partition.into(),
            edge: edge.into(),
        }
    }

    /// Create a not-found error for a row key.
    pub fn not_found(partition: impl Into<String>, edge: impl Into<String>) -> Self {
        StoreError::NotFound {
            partition: partition.into(),
            edge: edge.into(),
        }
    }

    /// Whether this error is an optimistic-write collision the caller should
    /// retry with a fresh read.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display_and_classification() {
        let err = StoreError::conflict("identity-1", "self");
        assert_eq!(err.to_string(), "Version conflict on (identity-1, self)");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_not_found_is_not_conflict() {
        let err = StoreError::not_found("identity-1", "self");
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "Row not found: (identity-1, self)");
    }
}
