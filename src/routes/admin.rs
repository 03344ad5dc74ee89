//! Administrative link routes, protected by the provider secret.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::events::ProviderCaller;
use super::store_error_to_status;
use crate::identity::Link;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RepointRequest {
    pub app_user_id: Uuid,
}

/// `GET /api/admin/links/{external_id}`
pub async fn get_link(
    State(state): State<AppState>,
    _caller: ProviderCaller,
    Path(external_id): Path<String>,
) -> Result<Json<Link>, StatusCode> {
    state
        .coordinator
        .link_for(&external_id)
        .await
        .map_err(|e| store_error_to_status(&e))?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// `PUT /api/admin/links/{external_id}`: point an existing link at another user.
pub async fn repoint_link(
    State(state): State<AppState>,
    _caller: ProviderCaller,
    Path(external_id): Path<String>,
    Json(body): Json<RepointRequest>,
) -> Result<Json<Link>, StatusCode> {
    let link = state
        .coordinator
        .repoint_link(&external_id, body.app_user_id)
        .await
        .map_err(|e| {
            tracing::warn!(%external_id, app_user_id = %body.app_user_id, error = %e, "link repoint refused");
            store_error_to_status(&e)
        })?;
    Ok(Json(link))
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
