//! # Castio Store
//!
//! Durable storage for the publisher-sync core, built on a
//! key/value-with-secondary-index abstraction:
//! - [`EdgeStore`]: point reads/writes by (partition id, edge key), prefix
//!   scans, batch get/put, optimistic conditional put, soft delete
//! - [`MemoryEdgeStore`]: in-process implementation for tests and local runs
//! - [`PgEdgeStore`]: Postgres implementation backed by a single `edges`
//!   table with version-guarded conditional writes
//! - Typed repositories for the three persisted models (publisher
//!   identities, media records, media stat snapshots)
//!
//! Rows are soft-deleted by default; hard removal exists only for the losing
//! side of an identity merge.

pub mod error;
pub mod key;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use models::identity::{PublisherIdentity, StepState};
pub use models::media::MediaRecord;
pub use models::stats::MediaStatRecord;
pub use repos::identity::{IdentityRepository, MapEntry};
pub use repos::media::MediaRepository;
pub use repos::stats::StatRepository;
pub use store::memory::MemoryEdgeStore;
pub use store::postgres::PgEdgeStore;
pub use store::{EdgeStore, RowKey, StoredRow};
