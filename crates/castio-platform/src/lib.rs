//! # Castio Platform
//!
//! The external-platform boundary of the sync core:
//! - [`PlatformClient`]: capability trait a platform integration implements
//!   (profile, media, per-media insights, account-level insights), honoring
//!   conditional-fetch hints
//! - [`PlatformError`]: the error taxonomy the sync core branches on
//!   (permission-class vs. content-precondition vs. generic)
//! - [`PlatformRegistry`]: static dispatch from platform kind to client
//!   instance, assembled once at startup
//! - [`TokenCipher`]: AES-256-GCM encryption for access tokens with
//!   per-identity derived keys; tokens are never persisted in the clear

pub mod client;
pub mod crypto;
pub mod error;
pub mod registry;
pub mod types;

pub use client::PlatformClient;
pub use crypto::{generate_master_key, generate_master_key_hex, TokenCipher};
pub use error::{PlatformError, PlatformResult};
pub use registry::PlatformRegistry;
pub use types::{InsightValue, RemoteInsight, RemoteMedia, RemoteProfile};
