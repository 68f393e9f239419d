//! Typed repositories over the edge store.

pub mod identity;
pub mod media;
pub mod stats;

/// Attempts made by repository helpers that retry optimistic-write
/// conflicts with a fresh read before giving up.
pub const CONFLICT_RETRIES: usize = 3;
