//! Error Types
//!
//! Base error type shared across the workspace. Layer-specific errors
//! (store, platform, sync) wrap or convert into this where they cross crate
//! boundaries.

use serde::Serialize;
use thiserror::Error;

/// Standardized error type for castio core operations.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// Requested resource was not found where existence was required.
    ///
    /// Expected-absent lookups return `Ok(None)` instead of this variant;
    /// it is reserved for operations that need the record to already exist.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// The type of resource that was not found (e.g. "PublisherIdentity").
        resource: String,
        /// Optional identifier of the resource.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Description of the validation failure.
        message: String,
    },

    /// An invariant of the data model was violated.
    #[error("Invariant violated: {message}")]
    Invariant {
        /// Description of the violated invariant.
        message: String,
    },
}

impl CoreError {
    /// Create a not-found error for a resource type and id.
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Type alias for Results using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = CoreError::not_found("PublisherIdentity", "abc-123");
        assert_eq!(error.to_string(), "PublisherIdentity not found: abc-123");

        let error = CoreError::NotFound {
            resource: "MediaRecord".to_string(),
            id: None,
        };
        assert_eq!(error.to_string(), "MediaRecord not found");
    }

    #[test]
    fn test_validation_display() {
        let error = CoreError::validation("username", "must not be empty");
        assert_eq!(
            error.to_string(),
            "Validation error on field 'username': must not be empty"
        );
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let error = CoreError::not_found("PublisherIdentity", "abc");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"not_found\""));
        assert!(json.contains("\"resource\":\"PublisherIdentity\""));
    }

    #[test]
    fn test_question_mark_propagation() {
        fn inner() -> Result<()> {
            Err(CoreError::Invariant {
                message: "duplicate identity".to_string(),
            })
        }

        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
