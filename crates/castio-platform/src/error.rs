//! Platform error taxonomy.
//!
//! The sync core branches on three classes: permission-class errors are
//! recorded as step failures without aborting sibling steps,
//! content-precondition errors are counted per item and eventually cause a
//! permanent per-item skip, and everything else is generic and aborts the
//! current account's run.

use thiserror::Error;

/// Error raised by a platform client or the token cipher.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform rejected the call for lack of authorization: revoked
    /// access, insufficient scope, or a deauthorized account.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// The access token is expired or invalidated.
    #[error("access token expired or invalid")]
    TokenExpired,

    /// The platform refuses to report on content published before the
    /// account converted to a business account.
    #[error("content predates account conversion: {media_external_id}")]
    PreconversionContent { media_external_id: String },

    /// The platform is throttling the caller.
    #[error("rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// The platform returned an unexpected API error.
    #[error("platform api error: {message}")]
    Api {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network failure talking to the platform.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No client is registered for the platform.
    #[error("unsupported platform: {platform}")]
    Unsupported { platform: String },

    /// Token encryption failed.
    #[error("encryption failed: {message}")]
    Encryption { message: String },

    /// Token decryption failed.
    #[error("decryption failed: {message}")]
    Decryption { message: String },
}

impl PlatformError {
    /// Whether this is a permission-class error: recorded as step-failure
    /// backoff state instead of aborting the account's run.
    #[must_use]
    pub fn is_permission_class(&self) -> bool {
        matches!(
            self,
            PlatformError::PermissionDenied { .. } | PlatformError::TokenExpired
        )
    }

    /// Whether this is the per-item content-precondition error.
    #[must_use]
    pub fn is_preconversion(&self) -> bool {
        matches!(self, PlatformError::PreconversionContent { .. })
    }

    /// Error code for log fields and failure events.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            PlatformError::PermissionDenied { .. } => "PERMISSION_DENIED",
            PlatformError::TokenExpired => "TOKEN_EXPIRED",
            PlatformError::PreconversionContent { .. } => "PRECONVERSION_CONTENT",
            PlatformError::RateLimited { .. } => "RATE_LIMITED",
            PlatformError::Api { .. } => "API_ERROR",
            PlatformError::Network { .. } => "NETWORK_ERROR",
            PlatformError::Unsupported { .. } => "UNSUPPORTED_PLATFORM",
            PlatformError::Encryption { .. } => "ENCRYPTION_FAILED",
            PlatformError::Decryption { .. } => "DECRYPTION_FAILED",
        }
    }

    // Convenience constructors

    /// Create a permission-denied error.
    pub fn permission(message: impl Into<String>) -> Self {
        PlatformError::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a content-precondition error for a media item.
    pub fn preconversion(media_external_id: impl Into<String>) -> Self {
        PlatformError::PreconversionContent {
            media_external_id: media_external_id.into(),
        }
    }

    /// Create a generic API error.
    pub fn api(message: impl Into<String>) -> Self {
        PlatformError::Api {
            message: message.into(),
            source: None,
        }
    }

    /// Create a generic API error with an underlying cause.
    pub fn api_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PlatformError::Api {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        PlatformError::Network {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_class_errors() {
        assert!(PlatformError::permission("scope revoked").is_permission_class());
        assert!(PlatformError::TokenExpired.is_permission_class());

        assert!(!PlatformError::api("boom").is_permission_class());
        assert!(!PlatformError::network("down").is_permission_class());
        assert!(!PlatformError::preconversion("m-1").is_permission_class());
    }

    #[test]
    fn test_preconversion_classification() {
        assert!(PlatformError::preconversion("m-1").is_preconversion());
        assert!(!PlatformError::permission("nope").is_preconversion());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PlatformError::permission("x").error_code(),
            "PERMISSION_DENIED"
        );
        assert_eq!(PlatformError::TokenExpired.error_code(), "TOKEN_EXPIRED");
        assert_eq!(
            PlatformError::preconversion("m").error_code(),
            "PRECONVERSION_CONTENT"
        );
    }

    #[test]
    fn test_display() {
        let err = PlatformError::preconversion("m-42");
        assert_eq!(
            err.to_string(),
            "content predates account conversion: m-42"
        );

        let err = PlatformError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 30 seconds");
    }

    #[test]
    fn test_error_with_source() {
        let source = std::io::Error::other("connection reset");
        let err = PlatformError::api_with_source("fetch failed", source);
        if let PlatformError::Api { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("expected Api variant");
        }
    }
}
