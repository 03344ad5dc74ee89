//! Sync coordinator. Applies provider lifecycle events to the application
//! user store and link table, and resolves the current user for readers.
//!
//! ARCHITECTURE
//! ============
//! The provider delivers each event at least once, so every handler is a
//! replay-safe function of (event, current link state):
//!
//! - created: link present -> nothing; else insert user, then link it
//! - updated: email unchanged or no link -> nothing; else patch email
//! - deleted: no link -> nothing; else delete user, then drop the link
//!
//! WRITE ORDERING
//! ==============
//! The user row is always written before the link that points at it and
//! deleted before the link is dropped. A crash between the two steps can
//! leave an unreachable user (acceptable) or a link whose user is gone
//! (resolved as "no application data" and cleaned up on redelivery), but
//! never a reader-visible link to a user that was never created.
//!
//! Per-key ordering is the dispatcher's job; the coordinator itself holds
//! no locks and does not reorder anything.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::{ExternalIdentity, IdentityEvent, Link, MergedUserView};
use crate::store::{LinkTable, StoreError, UserStore};

/// What a lifecycle handler actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { app_user_id: Uuid },
    EmailPatched { app_user_id: Uuid },
    Deleted { app_user_id: Uuid },
    /// Replay, unchanged field, or nothing linked.
    Unchanged,
}

pub struct SyncCoordinator {
    users: Arc<dyn UserStore>,
    links: Arc<dyn LinkTable>,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, links: Arc<dyn LinkTable>) -> Self {
        Self { users, links }
    }

    /// Route one lifecycle event to its handler.
    ///
    /// # Errors
    ///
    /// Propagates the handler's store error for the delivery layer to retry.
    pub async fn apply(&self, event: &IdentityEvent) -> Result<SyncOutcome, StoreError> {
        match event {
            IdentityEvent::Created { identity } => self.on_identity_created(identity).await,
            IdentityEvent::Updated { old, new } => self.on_identity_updated(old, new).await,
            IdentityEvent::Deleted { identity } => self.on_identity_deleted(identity).await,
        }
    }

    /// Create and link an application user for a new identity.
    ///
    /// # Errors
    ///
    /// `Write`/`Unavailable` if either write fails; `DuplicateLink` if a
    /// concurrent create linked the identity elsewhere first.
    pub async fn on_identity_created(&self, identity: &ExternalIdentity) -> Result<SyncOutcome, StoreError> {
        let external_id = identity.external_id.as_str();

        if let Some(link) = self.links.get(external_id).await? {
            debug!(external_id, app_user_id = %link.app_user_id, "identity already linked; replay ignored");
            return Ok(SyncOutcome::Unchanged);
        }

        let user = self.users.insert_user(&identity.email).await?;

        if let Err(e) = self.links.put(external_id, user.id).await {
            warn!(external_id, orphan_user_id = %user.id, error = %e, "link write failed; user left unlinked");
            return Err(e);
        }

        info!(external_id, app_user_id = %user.id, "application user created and linked");
        Ok(SyncOutcome::Created { app_user_id: user.id })
    }

    /// Mirror an identity email change onto its linked user.
    ///
    /// # Errors
    ///
    /// `Write`/`Unavailable` if the link lookup or patch fails.
    pub async fn on_identity_updated(
        &self,
        old: &ExternalIdentity,
        new: &ExternalIdentity,
    ) -> Result<SyncOutcome, StoreError> {
        let external_id = new.external_id.as_str();

        if old.external_id != new.external_id {
            warn!(old_external_id = %old.external_id, external_id, "update event changed external id; using new");
        }
        if old.email == new.email {
            debug!(external_id, "no synced field changed");
            return Ok(SyncOutcome::Unchanged);
        }

        let Some(link) = self.links.get(external_id).await? else {
            debug!(external_id, "update for unlinked identity ignored");
            return Ok(SyncOutcome::Unchanged);
        };

        if self.users.update_email(link.app_user_id, &new.email).await? {
            info!(external_id, app_user_id = %link.app_user_id, "application user email synced");
            Ok(SyncOutcome::EmailPatched { app_user_id: link.app_user_id })
        } else {
            debug!(external_id, app_user_id = %link.app_user_id, "email already in sync");
            Ok(SyncOutcome::Unchanged)
        }
    }

    /// Hard-delete the linked user and its link.
    ///
    /// # Errors
    ///
    /// `Write`/`Unavailable` if either delete fails; redelivery finishes the job.
    pub async fn on_identity_deleted(&self, identity: &ExternalIdentity) -> Result<SyncOutcome, StoreError> {
        let external_id = identity.external_id.as_str();

        let Some(link) = self.links.get(external_id).await? else {
            debug!(external_id, "delete for unlinked identity ignored");
            return Ok(SyncOutcome::Unchanged);
        };

        self.users.delete_user(link.app_user_id).await?;
        self.links.remove(external_id).await?;

        info!(external_id, app_user_id = %link.app_user_id, "application user deleted");
        Ok(SyncOutcome::Deleted { app_user_id: link.app_user_id })
    }

    /// Resolve the caller to a merged view.
    ///
    /// `None` caller -> `Ok(None)`. A caller without a link (or whose linked
    /// row is gone) gets identity fields only.
    ///
    /// # Errors
    ///
    /// Only `StoreError::Unavailable`; "not found" is never an error.
    pub async fn resolve_current_user(
        &self,
        caller: Option<&ExternalIdentity>,
    ) -> Result<Option<MergedUserView>, StoreError> {
        let Some(identity) = caller else {
            return Ok(None);
        };

        let Some(link) = self.links.get(&identity.external_id).await.map_err(as_unavailable)? else {
            return Ok(Some(MergedUserView::merge(identity, None)));
        };

        let user = self.users.get_user(link.app_user_id).await.map_err(as_unavailable)?;
        if user.is_none() {
            debug!(external_id = %identity.external_id, app_user_id = %link.app_user_id, "link target missing");
        }
        Ok(Some(MergedUserView::merge(identity, user.as_ref())))
    }

    /// Current link for an external id.
    ///
    /// # Errors
    ///
    /// `StoreError::Unavailable` if the link table cannot be read.
    pub async fn link_for(&self, external_id: &str) -> Result<Option<Link>, StoreError> {
        self.links.get(external_id).await
    }

    /// Administratively point an identity at a different application user.
    ///
    /// # Errors
    ///
    /// `LinkNotFound`, `MissingUser`, `UserAlreadyLinked`, or a store failure.
    pub async fn repoint_link(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError> {
        let link = self.links.repoint(external_id, app_user_id).await?;
        info!(external_id, app_user_id = %app_user_id, "link repointed");
        Ok(link)
    }

    /// Merge application-owned fields into the caller's linked user.
    /// Returns `None` when the identity is not linked yet.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn patch_fields(
        &self,
        identity: &ExternalIdentity,
        patch: &Map<String, Value>,
    ) -> Result<Option<MergedUserView>, StoreError> {
        let Some(link) = self.links.get(&identity.external_id).await? else {
            return Ok(None);
        };
        let Some(user) = self.users.merge_fields(link.app_user_id, patch).await? else {
            return Ok(None);
        };
        debug!(external_id = %identity.external_id, app_user_id = %user.id, keys = patch.len(), "fields patched");
        Ok(Some(MergedUserView::merge(identity, Some(&user))))
    }
}

fn as_unavailable(err: StoreError) -> StoreError {
    match err {
        StoreError::Unavailable(_) => err,
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
