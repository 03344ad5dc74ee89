//! Postgres store backend over `sqlx::PgPool`.
//!
//! DESIGN
//! ======
//! Every statement runs under `store_timeout`; an elapsed timeout surfaces
//! as `StoreError::Unavailable` instead of hanging the caller. The schema's
//! foreign key (`identity_links.app_user_id -> app_users.id ON DELETE
//! CASCADE`) is what makes link writes safe: a link to a missing user is
//! rejected by the database and a user delete takes its link with it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{LinkTable, StoreError, UserStore};
use crate::identity::{ApplicationUser, Link};

pub(crate) const TIMEOUT_MESSAGE: &str = "store call exceeded timeout";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Run one statement under `store_timeout`, classifying its failure with
    /// `on_error`. An elapsed timeout is `Unavailable` regardless of kind.
    async fn bounded<T, F, M>(&self, fut: F, on_error: M) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
        M: FnOnce(sqlx::Error) -> StoreError,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(on_error),
            Err(_elapsed) => Err(StoreError::Unavailable(TIMEOUT_MESSAGE.to_owned())),
        }
    }
}

fn is_connectivity(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed
    )
}

/// Reads never distinguish causes: any failure means the data is unreachable.
pub(crate) fn read_error(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

pub(crate) fn write_error(err: sqlx::Error) -> StoreError {
    if is_connectivity(&err) {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Write(err.to_string())
    }
}

/// Map FK / unique violations on `identity_links` to their invariant errors.
fn link_write_error(err: sqlx::Error, app_user_id: Uuid) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_foreign_key_violation() {
            return StoreError::MissingUser(app_user_id);
        }
        if db.is_unique_violation() {
            return StoreError::UserAlreadyLinked(app_user_id);
        }
    }
    write_error(err)
}

fn user_from_row(row: &PgRow) -> ApplicationUser {
    let fields = match row.get::<Value, _>("fields") {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ApplicationUser { id: row.get("id"), email: row.get("email"), fields }
}

fn link_from_row(row: &PgRow) -> Link {
    Link { external_id: row.get("external_id"), app_user_id: row.get("app_user_id") }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, email: &str) -> Result<ApplicationUser, StoreError> {
        let row = self
            .bounded(
                sqlx::query("INSERT INTO app_users (email) VALUES ($1) RETURNING id, email, fields")
                    .bind(email)
                    .fetch_one(&self.pool),
                write_error,
            )
            .await?;
        Ok(user_from_row(&row))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<ApplicationUser>, StoreError> {
        let row = self
            .bounded(
                sqlx::query("SELECT id, email, fields FROM app_users WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool),
                read_error,
            )
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn update_email(&self, id: Uuid, email: &str) -> Result<bool, StoreError> {
        let result = self
            .bounded(
                sqlx::query(
                    r"UPDATE app_users
                      SET email = $2, updated_at = now()
                      WHERE id = $1 AND email IS DISTINCT FROM $2",
                )
                .bind(id)
                .bind(email)
                .execute(&self.pool),
                write_error,
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn merge_fields(&self, id: Uuid, patch: &Map<String, Value>) -> Result<Option<ApplicationUser>, StoreError> {
        let row = self
            .bounded(
                sqlx::query(
                    r"UPDATE app_users
                      SET fields = fields || $2, updated_at = now()
                      WHERE id = $1
                      RETURNING id, email, fields",
                )
                .bind(id)
                .bind(Value::Object(patch.clone()))
                .fetch_optional(&self.pool),
                write_error,
            )
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = self
            .bounded(sqlx::query("DELETE FROM app_users WHERE id = $1").bind(id).execute(&self.pool), write_error)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LinkTable for PgStore {
    async fn put(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError> {
        let inserted = self
            .bounded(
                sqlx::query(
                    r"INSERT INTO identity_links (external_id, app_user_id)
                      VALUES ($1, $2)
                      ON CONFLICT (external_id) DO NOTHING",
                )
                .bind(external_id)
                .bind(app_user_id)
                .execute(&self.pool),
                |e| link_write_error(e, app_user_id),
            )
            .await?;

        if inserted.rows_affected() > 0 {
            return Ok(Link { external_id: external_id.to_owned(), app_user_id });
        }

        // Conflict on external_id: same target is a replay, anything else is a bug.
        match self.get(external_id).await? {
            Some(existing) if existing.app_user_id == app_user_id => Ok(existing),
            Some(existing) => Err(StoreError::DuplicateLink {
                external_id: external_id.to_owned(),
                existing: existing.app_user_id,
                requested: app_user_id,
            }),
            None => Err(StoreError::Write(format!("link for {external_id} changed concurrently"))),
        }
    }

    async fn get(&self, external_id: &str) -> Result<Option<Link>, StoreError> {
        let row = self
            .bounded(
                sqlx::query("SELECT external_id, app_user_id FROM identity_links WHERE external_id = $1")
                    .bind(external_id)
                    .fetch_optional(&self.pool),
                read_error,
            )
            .await?;
        Ok(row.as_ref().map(link_from_row))
    }

    async fn remove(&self, external_id: &str) -> Result<bool, StoreError> {
        let result = self
            .bounded(
                sqlx::query("DELETE FROM identity_links WHERE external_id = $1")
                    .bind(external_id)
                    .execute(&self.pool),
                write_error,
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn repoint(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError> {
        let row = self
            .bounded(
                sqlx::query(
                    r"UPDATE identity_links
                      SET app_user_id = $2, updated_at = now()
                      WHERE external_id = $1
                      RETURNING external_id, app_user_id",
                )
                .bind(external_id)
                .bind(app_user_id)
                .fetch_optional(&self.pool),
                |e| link_write_error(e, app_user_id),
            )
            .await?;

        row.as_ref()
            .map(link_from_row)
            .ok_or_else(|| StoreError::LinkNotFound(external_id.to_owned()))
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
