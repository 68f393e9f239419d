//! Account link resolution.
//!
//! Reconciles an incoming external account connection against whatever the
//! store already knows about that real-world account: an identity under the
//! same external id, one known through its counterpart-platform id, or a
//! soft-linked placeholder created before the account was ever connected.
//! The survivor always keeps its internal id, so references held elsewhere
//! in the marketplace never need rewriting.
//!
//! Conversions delete and recreate the identity row, and the store has no
//! multi-row transaction. The whole path therefore runs under a keyed lock
//! scoped to the external identifier, and any failure after the delete puts
//! the snapshot back exactly as it was read before the error propagates.

use std::sync::Arc;

use castio_core::types::{AccountKind, LinkState, PlatformKind};
use castio_platform::TokenCipher;
use castio_store::{key, IdentityRepository, PublisherIdentity};
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::lock::KeyedLock;
use crate::policy::SyncPolicy;

/// An incoming external account connection, as delivered by the OAuth
/// callback layer.
#[derive(Debug, Clone)]
pub struct IncomingConnection {
    /// Platform the connection was made on.
    pub platform: PlatformKind,

    /// Account id issued by the platform.
    pub external_id: String,

    /// Username at connection time.
    pub username: String,

    /// Kind of account.
    pub account_kind: AccountKind,

    /// Capability of the connection: [`LinkState::Basic`] for consumer
    /// scope, [`LinkState::Full`] for business scope.
    pub link_state: LinkState,

    /// Equivalent account id on the counterpart platform, when the OAuth
    /// response carried one.
    pub alternate_external_id: Option<String>,

    /// Access token granted with the connection.
    pub access_token: Option<String>,
}

/// How an incoming connection was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// No prior record; a brand-new identity was created.
    Created,

    /// A valid existing identity absorbed the connection in place.
    Absorbed,

    /// A soft-linked placeholder was replaced by the real connection,
    /// keeping the placeholder's internal id.
    UpConverted,

    /// An abandoned or deleted identity was replaced by the new, more
    /// limited connection, keeping its internal id.
    DownConverted,
}

/// Result of a resolution: the identity now persisted, and what happened.
#[derive(Debug)]
pub struct LinkResolution {
    /// The identity as stored.
    pub identity: PublisherIdentity,

    /// What the resolver did.
    pub action: LinkAction,
}

/// Resolves incoming connections to persisted identities.
pub struct AccountLinkResolver {
    identities: Arc<IdentityRepository>,
    cipher: TokenCipher,
    policy: SyncPolicy,
    conversion_locks: KeyedLock,
}

impl AccountLinkResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(identities: Arc<IdentityRepository>, cipher: TokenCipher, policy: SyncPolicy) -> Self {
        Self {
            identities,
            cipher,
            policy,
            conversion_locks: KeyedLock::new(),
        }
    }

    fn lock_key(platform: PlatformKind, external_id: &str) -> String {
        format!("{}|{external_id}", platform.as_str())
    }

    /// Resolve an incoming connection, creating, absorbing or converting as
    /// the link state machine dictates.
    #[instrument(skip(self, incoming), fields(platform = %incoming.platform, external_id = %incoming.external_id))]
    pub async fn resolve(&self, incoming: IncomingConnection) -> SyncResult<LinkResolution> {
        let _guard = self
            .conversion_locks
            .acquire(&Self::lock_key(incoming.platform, &incoming.external_id))
            .await;

        // Exact match first, then the counterpart-platform equivalent id.
        let mut existing = self
            .identities
            .find_by_external_any(incoming.platform, &incoming.external_id)
            .await?;
        if existing.is_none() {
            if let (Some(alt), Some(counterpart)) = (
                incoming.alternate_external_id.as_deref(),
                incoming.platform.counterpart(),
            ) {
                existing = self.identities.find_by_external_any(counterpart, alt).await?;
            }
        }

        if let Some(found) = existing {
            if self.is_absorbable(&found) {
                return self.absorb(found, incoming).await;
            }
            return self.convert_in_place(found, incoming, LinkAction::DownConverted).await;
        }

        // No writable match; a placeholder with the same username and role
        // may be waiting for this connection.
        if let Some(placeholder) = self
            .identities
            .find_soft_linked(incoming.platform, &incoming.username, incoming.account_kind)
            .await?
        {
            return self
                .convert_in_place(placeholder, incoming, LinkAction::UpConverted)
                .await;
        }

        self.create_new(incoming).await
    }

    /// Create a soft-linked placeholder standing in for an account that is
    /// referenced before it is connected.
    #[instrument(skip(self))]
    pub async fn create_placeholder(
        &self,
        platform: PlatformKind,
        username: &str,
        account_kind: AccountKind,
    ) -> SyncResult<PublisherIdentity> {
        let _guard = self
            .conversion_locks
            .acquire(&Self::lock_key(
                platform,
                &key::soft_link_external_id(username),
            ))
            .await;

        if let Some(placeholder) = self
            .identities
            .find_soft_linked(platform, username, account_kind)
            .await?
        {
            return Ok(placeholder);
        }

        let mut placeholder =
            PublisherIdentity::new_soft_linked(platform, username, account_kind);
        self.identities.create(&mut placeholder).await?;
        info!(identity_id = %placeholder.id, username, "Created soft-linked placeholder");
        Ok(placeholder)
    }

    /// Whether an existing identity may absorb a new connection in place:
    /// not deleted, not a placeholder, and not abandoned (both syncs stale
    /// past the threshold with no fresher token).
    fn is_absorbable(&self, identity: &PublisherIdentity) -> bool {
        if identity.deleted || identity.is_soft_linked() {
            return false;
        }
        let now = Utc::now();
        let threshold = self.policy.stale_threshold();
        let sync_stale = identity.is_sync_stale(threshold, now);
        let token_stale = identity
            .token_updated_at
            .is_none_or(|t| t <= now - threshold);
        !(sync_stale && token_stale)
    }

    /// Fold an incoming connection into a valid existing identity.
    async fn absorb(
        &self,
        existing: PublisherIdentity,
        incoming: IncomingConnection,
    ) -> SyncResult<LinkResolution> {
        let now = Utc::now();
        let encrypted = incoming
            .access_token
            .as_deref()
            .map(|t| self.cipher.encrypt_token(existing.id, t))
            .transpose()?;

        let incoming_platform = incoming.platform;
        let incoming_external_id = incoming.external_id.clone();
        let same_platform = existing.platform == incoming.platform;
        let identity = self
            .identities
            .modify(existing.id, move |identity| {
                if same_platform {
                    identity.username = incoming.username.clone();
                    identity.account_kind = incoming.account_kind;
                    // Capability only moves up on absorption; dropping scope
                    // is the down-conversion path.
                    if incoming.link_state.rank() > identity.link_state.rank() {
                        identity.link_state = incoming.link_state;
                    }
                    if incoming.alternate_external_id.is_some() {
                        identity.alternate_external_id =
                            incoming.alternate_external_id.clone();
                    }
                } else {
                    // Counterpart-platform connection: the incoming id
                    // becomes (or confirms) the alternate.
                    identity.alternate_external_id = Some(incoming.external_id.clone());
                }
                if let Some(blob) = encrypted.clone() {
                    identity.set_encrypted_token(blob, now);
                }
            })
            .await?;

        // Keep external-id lookups point reads for the incoming ids.
        self.identities
            .put_identifier_map(incoming_platform, &incoming_external_id, identity.id, false)
            .await?;
        if let (Some(alt), Some(counterpart)) = (
            identity.alternate_external_id.as_deref(),
            identity.platform.counterpart(),
        ) {
            self.identities
                .put_identifier_map(counterpart, alt, identity.id, false)
                .await?;
        }

        info!(identity_id = %identity.id, "Absorbed connection into existing identity");
        Ok(LinkResolution {
            identity,
            action: LinkAction::Absorbed,
        })
    }

    /// Replace `losing` with a record built from the incoming connection,
    /// keeping the internal id. Delete-then-recreate with a compensating
    /// restore: storage has no multi-row transaction.
    async fn convert_in_place(
        &self,
        losing: PublisherIdentity,
        incoming: IncomingConnection,
        action: LinkAction,
    ) -> SyncResult<LinkResolution> {
        let now = Utc::now();
        let Some(snapshot) = self.identities.get(losing.id).await? else {
            return Err(SyncError::IdentityNotFound { id: losing.id });
        };

        // Everything fallible that can run before the delete, does.
        let mut replacement = PublisherIdentity::new_connected(
            incoming.platform,
            incoming.external_id.clone(),
            incoming.username.clone(),
            incoming.account_kind,
            incoming.link_state,
        );
        replacement.id = snapshot.id;
        replacement.created_at = snapshot.created_at;
        replacement.metrics = snapshot.metrics.clone();
        replacement.alternate_external_id = incoming.alternate_external_id.clone();
        if let Some(token) = incoming.access_token.as_deref() {
            let blob = self.cipher.encrypt_token(replacement.id, token)?;
            replacement.set_encrypted_token(blob, now);
        }

        self.identities.remove(snapshot.id).await?;
        match self.finish_conversion(&snapshot, &mut replacement).await {
            Ok(()) => {
                info!(
                    identity_id = %replacement.id,
                    action = ?action,
                    "Converted identity in place"
                );
                Ok(LinkResolution {
                    identity: replacement,
                    action,
                })
            }
            Err(e) => {
                warn!(
                    identity_id = %snapshot.id,
                    error = %e,
                    "Conversion failed after delete; restoring original identity"
                );
                if let Err(restore_err) = self.identities.restore(&snapshot).await {
                    // The compensating write itself failed; the original
                    // error still propagates, but this needs eyes.
                    error!(
                        identity_id = %snapshot.id,
                        error = %restore_err,
                        "Failed to restore identity after aborted conversion"
                    );
                }
                Err(e)
            }
        }
    }

    /// The fallible tail of a conversion, separated so the caller can
    /// compensate when any of it fails.
    async fn finish_conversion(
        &self,
        snapshot: &PublisherIdentity,
        replacement: &mut PublisherIdentity,
    ) -> SyncResult<()> {
        self.identities.create(replacement).await?;

        // The losing record's old identifiers keep resolving to the
        // surviving internal id, as soft-link associations.
        if snapshot.external_id != replacement.external_id {
            self.identities
                .put_identifier_map(
                    snapshot.platform,
                    &snapshot.external_id,
                    replacement.id,
                    true,
                )
                .await?;
        }
        if let (Some(alt), Some(counterpart)) = (
            snapshot.alternate_external_id.as_deref(),
            snapshot.platform.counterpart(),
        ) {
            if replacement.alternate_external_id.as_deref() != Some(alt) {
                self.identities
                    .put_identifier_map(counterpart, alt, replacement.id, true)
                    .await?;
            }
        }
        Ok(())
    }

    /// Persist a brand-new identity for a first-time connection.
    async fn create_new(&self, incoming: IncomingConnection) -> SyncResult<LinkResolution> {
        let now = Utc::now();
        let mut identity = PublisherIdentity::new_connected(
            incoming.platform,
            incoming.external_id,
            incoming.username,
            incoming.account_kind,
            incoming.link_state,
        );
        identity.alternate_external_id = incoming.alternate_external_id;
        if let Some(token) = incoming.access_token.as_deref() {
            let blob = self.cipher.encrypt_token(identity.id, token)?;
            identity.set_encrypted_token(blob, now);
        }
        self.identities.create(&mut identity).await?;

        info!(identity_id = %identity.id, "Created new publisher identity");
        Ok(LinkResolution {
            identity,
            action: LinkAction::Created,
        })
    }
}
