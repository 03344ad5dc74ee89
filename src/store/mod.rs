//! Storage seams for the sync bridge.
//!
//! ARCHITECTURE
//! ============
//! `UserStore` owns `ApplicationUser` rows and `LinkTable` owns the
//! `external_id -> app_user_id` mapping. The coordinator only talks to these
//! traits, so the Postgres backend and the in-memory backend enforce the
//! same invariants:
//!
//! - a link can only be written to an existing user (no dangling links)
//! - at most one link per external id, at most one link per user
//! - deleting a user removes any link pointing at it
//!
//! ERROR HANDLING
//! ==============
//! Reads only ever fail with `Unavailable`. Writes fail with `Write` or
//! `Unavailable` (both retryable) or with one of the invariant variants,
//! which retrying will not fix.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::identity::{ApplicationUser, Link};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    Write(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate link for {external_id}: points at {existing}, refused {requested}")]
    DuplicateLink { external_id: String, existing: Uuid, requested: Uuid },
    #[error("application user {0} does not exist")]
    MissingUser(Uuid),
    #[error("application user {0} is already linked")]
    UserAlreadyLinked(Uuid),
    #[error("no link for {0}")]
    LinkNotFound(String),
}

impl StoreError {
    /// Whether redelivering the same event can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Unavailable(_))
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a fresh user seeded with `email` and empty fields.
    async fn insert_user(&self, email: &str) -> Result<ApplicationUser, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<ApplicationUser>, StoreError>;

    /// Set the user's email. Returns `false` when the row is missing or
    /// already holds `email` (nothing written).
    async fn update_email(&self, id: Uuid, email: &str) -> Result<bool, StoreError>;

    /// Shallow-merge `patch` into the user's fields.
    async fn merge_fields(&self, id: Uuid, patch: &Map<String, Value>) -> Result<Option<ApplicationUser>, StoreError>;

    /// Hard delete. Any link pointing at the user goes with it.
    /// Returns `false` when the user was already gone.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait LinkTable: Send + Sync {
    /// Write `external_id -> app_user_id`. Re-putting the same pair succeeds;
    /// a different target for an existing external id is `DuplicateLink`.
    async fn put(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError>;

    async fn get(&self, external_id: &str) -> Result<Option<Link>, StoreError>;

    /// Remove the link. Returns `false` when it was already absent.
    async fn remove(&self, external_id: &str) -> Result<bool, StoreError>;

    /// Administratively move an existing link to another existing user.
    async fn repoint(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError>;
}
