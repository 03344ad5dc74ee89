//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two audiences share one Axum router. The UI calls `/api/auth/*` and
//! `/api/users/*` with a session cookie. The auth provider calls
//! `/api/identity/events` and `/api/admin/*` with the shared provider secret.

pub mod admin;
pub mod auth;
pub mod events;
pub mod users;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::store::StoreError;

/// Full HTTP surface of the bridge.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/sign-up", post(auth::sign_up))
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route("/api/auth/me", get(auth::me))
        .route("/api/users/me/fields", patch(users::patch_my_fields))
        .route("/api/identity/events", post(events::receive_event))
        .route(
            "/api/admin/links/{external_id}",
            get(admin::get_link).put(admin::repoint_link),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Shared mapping for store failures surfaced over HTTP.
pub(crate) fn store_error_to_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::DuplicateLink { .. } | StoreError::UserAlreadyLinked(_) => StatusCode::CONFLICT,
        StoreError::MissingUser(_) | StoreError::LinkNotFound(_) => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
