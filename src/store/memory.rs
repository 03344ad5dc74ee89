//! In-memory store backend.
//!
//! Both traits are served from one `RwLock`, so the cross-table invariants
//! (link target must exist, user delete cascades to its link) hold under
//! the same lock the Postgres backend gets from its foreign key.
//! Fault switches let tests simulate a failing or unreachable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LinkTable, StoreError, UserStore};
use crate::identity::{ApplicationUser, Link};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, ApplicationUser>,
    links: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Count of committed mutations, for replay assertions.
    writes: AtomicUsize,
    fail_link_writes: AtomicBool,
    fail_user_writes: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutations committed so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn link_count(&self) -> usize {
        self.tables.read().await.links.len()
    }

    /// Users whose email matches, linked or not.
    pub async fn users_with_email(&self, email: &str) -> Vec<ApplicationUser> {
        self.tables
            .read()
            .await
            .users
            .values()
            .filter(|u| u.email == email)
            .cloned()
            .collect()
    }

    pub fn set_fail_link_writes(&self, fail: bool) {
        self.fail_link_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_user_writes(&self, fail: bool) {
        self.fail_user_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn check_user_write(&self) -> Result<(), StoreError> {
        self.check_available()?;
        if self.fail_user_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected user write failure".into()));
        }
        Ok(())
    }

    fn check_link_write(&self) -> Result<(), StoreError> {
        self.check_available()?;
        if self.fail_link_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected link write failure".into()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn linked_elsewhere(tables: &Tables, external_id: &str, app_user_id: Uuid) -> bool {
    tables
        .links
        .iter()
        .any(|(ext, target)| *target == app_user_id && ext != external_id)
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, email: &str) -> Result<ApplicationUser, StoreError> {
        self.check_user_write()?;
        let user = ApplicationUser { id: Uuid::new_v4(), email: email.to_owned(), fields: Map::new() };
        self.tables.write().await.users.insert(user.id, user.clone());
        self.record_write();
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<ApplicationUser>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn update_email(&self, id: Uuid, email: &str) -> Result<bool, StoreError> {
        self.check_user_write()?;
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(false);
        };
        if user.email == email {
            return Ok(false);
        }
        email.clone_into(&mut user.email);
        drop(tables);
        self.record_write();
        Ok(true)
    }

    async fn merge_fields(&self, id: Uuid, patch: &Map<String, Value>) -> Result<Option<ApplicationUser>, StoreError> {
        self.check_user_write()?;
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        for (key, value) in patch {
            user.fields.insert(key.clone(), value.clone());
        }
        let updated = user.clone();
        drop(tables);
        self.record_write();
        Ok(Some(updated))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_user_write()?;
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        tables.links.retain(|_, target| *target != id);
        drop(tables);
        self.record_write();
        Ok(true)
    }
}

#[async_trait]
impl LinkTable for MemoryStore {
    async fn put(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError> {
        self.check_link_write()?;
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.links.get(external_id).copied() {
            if existing == app_user_id {
                return Ok(Link { external_id: external_id.to_owned(), app_user_id });
            }
            return Err(StoreError::DuplicateLink {
                external_id: external_id.to_owned(),
                existing,
                requested: app_user_id,
            });
        }
        if !tables.users.contains_key(&app_user_id) {
            return Err(StoreError::MissingUser(app_user_id));
        }
        if linked_elsewhere(&tables, external_id, app_user_id) {
            return Err(StoreError::UserAlreadyLinked(app_user_id));
        }

        tables.links.insert(external_id.to_owned(), app_user_id);
        drop(tables);
        self.record_write();
        Ok(Link { external_id: external_id.to_owned(), app_user_id })
    }

    async fn get(&self, external_id: &str) -> Result<Option<Link>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .links
            .get(external_id)
            .map(|app_user_id| Link { external_id: external_id.to_owned(), app_user_id: *app_user_id }))
    }

    async fn remove(&self, external_id: &str) -> Result<bool, StoreError> {
        self.check_link_write()?;
        let removed = self.tables.write().await.links.remove(external_id).is_some();
        if removed {
            self.record_write();
        }
        Ok(removed)
    }

    async fn repoint(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError> {
        self.check_link_write()?;
        let mut tables = self.tables.write().await;

        if !tables.links.contains_key(external_id) {
            return Err(StoreError::LinkNotFound(external_id.to_owned()));
        }
        if !tables.users.contains_key(&app_user_id) {
            return Err(StoreError::MissingUser(app_user_id));
        }
        if linked_elsewhere(&tables, external_id, app_user_id) {
            return Err(StoreError::UserAlreadyLinked(app_user_id));
        }

        tables.links.insert(external_id.to_owned(), app_user_id);
        drop(tables);
        self.record_write();
        Ok(Link { external_id: external_id.to_owned(), app_user_id })
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
