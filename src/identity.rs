//! Identity data model: the provider identity, the application user, the link
//! between them, and the merged view handed to readers.
//!
//! DESIGN
//! ======
//! `ExternalIdentity` is owned by the auth provider and only ever observed
//! here. `ApplicationUser` is the row the rest of the application joins
//! against. A `Link` ties the two together. Readers see a `MergedUserView`
//! where provider-owned keys always win over application-owned ones.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Keys the merged view reserves for identity attributes. Application fields
/// using any of these names are shadowed by the identity side.
pub const RESERVED_KEYS: &[&str] = &["externalId", "email", "emailVerified", "createdAt", "userId"];

// =============================================================================
// EXTERNAL IDENTITY
// =============================================================================

/// Identity record as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdentity {
    pub external_id: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// APPLICATION USER / LINK
// =============================================================================

/// First-party user row. Mirrors `app_users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationUser {
    pub id: Uuid,
    pub email: String,
    /// Application-owned attributes the provider knows nothing about.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// `external_id -> app_user_id`. Mirrors `identity_links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub external_id: String,
    pub app_user_id: Uuid,
}

// =============================================================================
// LIFECYCLE EVENTS
// =============================================================================

/// Lifecycle notification emitted by the provider around its own writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    Created { identity: ExternalIdentity },
    Updated { old: ExternalIdentity, new: ExternalIdentity },
    Deleted { identity: ExternalIdentity },
}

impl IdentityEvent {
    /// Ordering key: events for the same external id must apply in order.
    #[must_use]
    pub fn external_id(&self) -> &str {
        match self {
            Self::Created { identity } | Self::Deleted { identity } => &identity.external_id,
            Self::Updated { new, .. } => &new.external_id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
        }
    }
}

// =============================================================================
// MERGED VIEW
// =============================================================================

/// What `getCurrentUser` returns: identity attributes plus, when a link
/// resolves, the application user's id and fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedUserView {
    pub external_id: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Absent when the identity has no link yet (or its user row is gone).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MergedUserView {
    /// Merge an identity with its application user, identity keys winning.
    #[must_use]
    pub fn merge(identity: &ExternalIdentity, user: Option<&ApplicationUser>) -> Self {
        let (user_id, fields) = match user {
            Some(user) => {
                let fields = user
                    .fields
                    .iter()
                    .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                (Some(user.id), fields)
            }
            None => (None, Map::new()),
        };

        Self {
            external_id: identity.external_id.clone(),
            email: identity.email.clone(),
            email_verified: identity.email_verified,
            created_at: identity.created_at,
            user_id,
            fields,
        }
    }

    /// True when application-owned data was available for this identity.
    #[must_use]
    pub fn has_application_user(&self) -> bool {
        self.user_id.is_some()
    }
}

// =============================================================================
// FIELD PATCHES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FieldPatchError {
    #[error("field patch must be a JSON object")]
    NotAnObject,
    #[error("field {0:?} is reserved for identity attributes")]
    ReservedKey(String),
}

/// Validate a patch for `ApplicationUser::fields`.
///
/// # Errors
///
/// Rejects non-objects and any key the merged view reserves.
pub fn validate_field_patch(patch: &Value) -> Result<&Map<String, Value>, FieldPatchError> {
    let Value::Object(map) = patch else {
        return Err(FieldPatchError::NotAnObject);
    };
    if let Some(key) = map.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
        return Err(FieldPatchError::ReservedKey(key.clone()));
    }
    Ok(map)
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
