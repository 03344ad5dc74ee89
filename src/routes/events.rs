//! Provider-facing lifecycle webhook.
//!
//! SYSTEM CONTEXT
//! ==============
//! The provider posts one `IdentityEvent` per request and redelivers on any
//! 5xx. Handlers are replay-safe, so a retry after a partial failure converges.
//! `DuplicateLink` is answered with 409 so the provider stops redelivering.

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::Json;

use super::store_error_to_status;
use crate::identity::IdentityEvent;
use crate::services::dispatch::DispatchError;
use crate::state::AppState;

pub(crate) const SECRET_HEADER: &str = "x-identity-webhook-secret";

/// Byte comparison whose running time does not depend on where the inputs differ.
pub(crate) fn secret_matches(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

// =============================================================================
// PROVIDER EXTRACTOR
// =============================================================================

/// Marker for requests carrying the shared provider secret.
pub struct ProviderCaller;

impl<S> axum::extract::FromRequestParts<S> for ProviderCaller
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let provided = parts
            .headers
            .get(SECRET_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();

        if secret_matches(provided, app_state.config.provider_secret.as_bytes()) {
            Ok(Self)
        } else {
            tracing::warn!("rejected provider call with bad or missing secret");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

pub(crate) fn dispatch_error_to_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::Sync(e) => store_error_to_status(e),
        DispatchError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `POST /api/identity/events`: apply one lifecycle event.
pub async fn receive_event(
    State(state): State<AppState>,
    _caller: ProviderCaller,
    Json(event): Json<IdentityEvent>,
) -> StatusCode {
    let external_id = event.external_id().to_owned();
    let kind = event.kind();

    match state.dispatcher.submit(event).await {
        Ok(outcome) => {
            tracing::debug!(%external_id, kind, ?outcome, "lifecycle event accepted");
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            let status = dispatch_error_to_status(&e);
            if e.is_retryable() {
                tracing::warn!(%external_id, kind, error = %e, "lifecycle event failed; provider will redeliver");
            } else {
                tracing::error!(%external_id, kind, error = %e, "lifecycle event rejected");
            }
            status
        }
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
