//! User routes for application-owned fields.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::Value;

use super::auth::AuthUser;
use super::store_error_to_status;
use crate::identity::{MergedUserView, validate_field_patch};
use crate::state::AppState;

/// `PATCH /api/users/me/fields`: merge keys into the caller's application user.
///
/// 409 until the provider's `created` event has linked the caller.
pub async fn patch_my_fields(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(patch): Json<Value>,
) -> Result<Json<MergedUserView>, (StatusCode, String)> {
    let fields = validate_field_patch(&patch).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let view = state
        .coordinator
        .patch_fields(&auth.identity, fields)
        .await
        .map_err(|e| {
            tracing::warn!(external_id = %auth.identity.external_id, error = %e, "field patch failed");
            (store_error_to_status(&e), "update failed".to_owned())
        })?
        .ok_or_else(|| (StatusCode::CONFLICT, "account is not provisioned yet".to_owned()))?;

    Ok(Json(view))
}

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;
