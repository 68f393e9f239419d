//! Publisher identity repository.
//!
//! Identity rows are keyed (internal id, `self`). Lookups by external id go
//! through reverse-map rows keyed by a hash of (platform, external id), so
//! they stay point reads. Saves are optimistic: the identity's `updated_at`
//! mirrors the stored row version and is refreshed on every read and write.

use std::sync::Arc;

use castio_core::ids::IdentityId;
use castio_core::types::{AccountKind, PlatformKind};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{StoreError, StoreResult};
use crate::key;
use crate::models::identity::PublisherIdentity;
use crate::repos::CONFLICT_RETRIES;
use crate::store::{EdgeStore, StoredRow};

/// Value of an identifier-map row: external id → internal id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEntry {
    /// The internal id the external id resolves to.
    pub identity_id: IdentityId,

    /// Soft-link association preserved through a conversion, rather than a
    /// claim that the target identity currently carries this external id.
    #[serde(default)]
    pub soft: bool,
}

/// Repository for [`PublisherIdentity`] rows and their identifier maps.
pub struct IdentityRepository {
    store: Arc<dyn EdgeStore>,
}

impl IdentityRepository {
    /// Create a repository over a store.
    #[must_use]
    pub fn new(store: Arc<dyn EdgeStore>) -> Self {
        Self { store }
    }

    fn decode(row: &StoredRow) -> StoreResult<PublisherIdentity> {
        let mut identity: PublisherIdentity = row.decode()?;
        identity.updated_at = row.version;
        identity.deleted = row.deleted;
        Ok(identity)
    }

    /// Create a brand-new identity. Fails with a conflict if a row for this
    /// internal id already exists.
    #[instrument(skip(self, identity), fields(identity_id = %identity.id))]
    pub async fn create(&self, identity: &mut PublisherIdentity) -> StoreResult<()> {
        let row = self
            .store
            .put_if_version(
                &identity.id.to_string(),
                key::SELF_EDGE,
                serde_json::to_value(&*identity)?,
                None,
            )
            .await?;
        identity.updated_at = row.version;

        self.put_identifier_map(identity.platform, &identity.external_id, identity.id, false)
            .await?;
        if let (Some(alt), Some(counterpart)) = (
            identity.alternate_external_id.as_deref(),
            identity.platform.counterpart(),
        ) {
            self.put_identifier_map(counterpart, alt, identity.id, false)
                .await?;
        }
        Ok(())
    }

    /// Point read by internal id. Soft-deleted identities are returned with
    /// their marker set.
    #[instrument(skip(self))]
    pub async fn get(&self, id: IdentityId) -> StoreResult<Option<PublisherIdentity>> {
        let row = self.store.get(&id.to_string(), key::SELF_EDGE).await?;
        row.as_ref().map(Self::decode).transpose()
    }

    /// Point read by internal id, filtering out soft-deleted identities.
    pub async fn get_active(&self, id: IdentityId) -> StoreResult<Option<PublisherIdentity>> {
        Ok(self.get(id).await?.filter(|i| !i.deleted))
    }

    /// Optimistic save. Conflicts when another writer touched the row since
    /// it was read; the caller re-reads and retries.
    #[instrument(skip(self, identity), fields(identity_id = %identity.id))]
    pub async fn save(&self, identity: &mut PublisherIdentity) -> StoreResult<()> {
        let expected = identity.updated_at;
        let row = self
            .store
            .put_if_version(
                &identity.id.to_string(),
                key::SELF_EDGE,
                serde_json::to_value(&*identity)?,
                Some(expected),
            )
            .await?;
        identity.updated_at = row.version;
        Ok(())
    }

    /// Read-modify-write with conflict retries. The closure is re-applied to
    /// a fresh read on every attempt; the identity must exist and be active.
    #[instrument(skip(self, mutate))]
    pub async fn modify<F>(&self, id: IdentityId, mutate: F) -> StoreResult<PublisherIdentity>
    where
        F: Fn(&mut PublisherIdentity),
    {
        let mut last_err = None;
        for _ in 0..CONFLICT_RETRIES {
            let Some(mut identity) = self.get_active(id).await? else {
                return Err(StoreError::not_found(id.to_string(), key::SELF_EDGE));
            };
            mutate(&mut identity);
            match self.save(&mut identity).await {
                Ok(()) => return Ok(identity),
                Err(e) if e.is_conflict() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::conflict(id.to_string(), key::SELF_EDGE)))
    }

    /// Lookup by (platform, external id) through the identifier map.
    ///
    /// Hard map entries are validated against the resolved identity's
    /// current external ids so that entries left behind by conversions
    /// cannot produce false matches; soft entries resolve as-is.
    #[instrument(skip(self))]
    pub async fn find_by_external(
        &self,
        platform: PlatformKind,
        external_id: &str,
    ) -> StoreResult<Option<PublisherIdentity>> {
        self.resolve_external(platform, external_id, false).await
    }

    /// Like [`Self::find_by_external`], but soft-deleted identities are
    /// returned with their marker set. The conversion path needs this:
    /// a deleted identity still claims its internal id.
    #[instrument(skip(self))]
    pub async fn find_by_external_any(
        &self,
        platform: PlatformKind,
        external_id: &str,
    ) -> StoreResult<Option<PublisherIdentity>> {
        self.resolve_external(platform, external_id, true).await
    }

    async fn resolve_external(
        &self,
        platform: PlatformKind,
        external_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Option<PublisherIdentity>> {
        let partition = key::external_map_partition(platform, external_id);
        let Some(row) = self.store.get(&partition, key::MAP_EDGE).await? else {
            return Ok(None);
        };
        if row.deleted {
            return Ok(None);
        }
        let entry: MapEntry = row.decode()?;
        let Some(identity) = self.get(entry.identity_id).await? else {
            return Ok(None);
        };
        if identity.deleted && !include_deleted {
            return Ok(None);
        }
        if entry.soft {
            return Ok(Some(identity));
        }
        let matches = identity.external_id == external_id
            || identity.alternate_external_id.as_deref() == Some(external_id);
        Ok(matches.then_some(identity))
    }

    /// Lookup a soft-linked placeholder by username and account kind.
    #[instrument(skip(self))]
    pub async fn find_soft_linked(
        &self,
        platform: PlatformKind,
        username: &str,
        account_kind: AccountKind,
    ) -> StoreResult<Option<PublisherIdentity>> {
        let external_id = key::soft_link_external_id(username);
        let found = self.find_by_external(platform, &external_id).await?;
        Ok(found.filter(|i| i.is_soft_linked() && i.account_kind == account_kind))
    }

    /// Create or repoint an identifier-map entry.
    #[instrument(skip(self))]
    pub async fn put_identifier_map(
        &self,
        platform: PlatformKind,
        external_id: &str,
        identity_id: IdentityId,
        soft: bool,
    ) -> StoreResult<()> {
        let partition = key::external_map_partition(platform, external_id);
        let entry = MapEntry { identity_id, soft };
        self.store
            .put(&partition, key::MAP_EDGE, serde_json::to_value(entry)?)
            .await?;
        Ok(())
    }

    /// Soft-delete an identity row.
    #[instrument(skip(self))]
    pub async fn mark_deleted(&self, id: IdentityId) -> StoreResult<()> {
        self.store
            .mark_deleted(&id.to_string(), key::SELF_EDGE)
            .await
    }

    /// Hard-remove an identity row. Only the losing side of a conversion is
    /// ever removed this way; map entries are left in place and re-resolve
    /// through the surviving record.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: IdentityId) -> StoreResult<()> {
        self.store.remove(&id.to_string(), key::SELF_EDGE).await
    }

    /// Compensating write: put an identity row back exactly as it was read.
    /// Used to undo a conversion whose later steps failed.
    #[instrument(skip(self, identity), fields(identity_id = %identity.id))]
    pub async fn restore(&self, identity: &PublisherIdentity) -> StoreResult<()> {
        self.store
            .put(
                &identity.id.to_string(),
                key::SELF_EDGE,
                serde_json::to_value(identity)?,
            )
            .await?;
        Ok(())
    }
}
