//! # Castio Core
//!
//! Shared foundation for the castio publisher-sync workspace:
//! - Strongly typed identifiers (newtype pattern over UUID)
//! - Shared domain enums (platform, link state, account kind, content kind)
//! - The base error type used across crates

pub mod error;
pub mod ids;
pub mod types;

pub use error::{CoreError, Result};
pub use ids::{IdentityId, MediaId, ParseIdError, SyncRunId};
pub use types::{AccountKind, LinkState, MediaKind, PlatformKind, StatPeriod};
