//! Strongly Typed Identifiers
//!
//! Newtype wrappers around `uuid::Uuid` so the different identifier kinds in
//! the sync core cannot be confused at compile time.
//!
//! # Example
//!
//! ```
//! use castio_core::{IdentityId, MediaId};
//!
//! let identity = IdentityId::new();
//! let media = MediaId::new();
//!
//! fn owned_by(id: IdentityId) -> String {
//!     id.to_string()
//! }
//!
//! let _ = owned_by(identity);
//! // owned_by(media); // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier for a publisher identity.
    ///
    /// Stable across link-state conversions: when an identity is up- or
    /// down-converted the surviving record keeps this id, so references held
    /// by other parts of the marketplace never need rewriting.
    IdentityId
);

define_id!(
    /// Identifier for a stored media record (post or story).
    MediaId
);

define_id!(
    /// Identifier for one orchestrated sync run over a single account.
    SyncRunId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_distinct_ids() {
        assert_ne!(IdentityId::new(), IdentityId::new());
        assert_ne!(MediaId::new(), MediaId::new());
    }

    #[test]
    fn test_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = IdentityId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn test_display_returns_uuid_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = MediaId::from_uuid(uuid);
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_valid_uuid() {
        let id: IdentityId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_invalid_uuid_returns_error() {
        let result: std::result::Result<SyncRunId, _> = "not-a-uuid".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "SyncRunId");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = IdentityId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = MediaId::new();
        let json = serde_json::to_string(&original).unwrap();
        let deserialized: MediaId = serde_json::from_str(&json).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_can_use_as_hashmap_key() {
        use std::collections::HashMap;

        let mut map: HashMap<IdentityId, &str> = HashMap::new();
        let id = IdentityId::new();
        map.insert(id, "creator");
        assert_eq!(map.get(&id), Some(&"creator"));
    }
}
