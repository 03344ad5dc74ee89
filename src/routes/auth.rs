//! Auth routes: sign-in, sign-up, sign-out, and the current-user lookup.
//!
//! Credentials are forwarded to the provider. The session token it issues
//! is kept in an HttpOnly cookie; bearer tokens are accepted as well for
//! non-browser callers.

use axum::extract::{FromRef, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use time::Duration;

use crate::identity::{ExternalIdentity, MergedUserView};
use crate::services::provider::{AuthError, Credentials, Session, SignUpProfile};
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";

/// Session token from the cookie, falling back to `Authorization: Bearer`.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(COOKIE_NAME).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_owned());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

pub(crate) fn auth_error_to_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::Rejected(_) => StatusCode::BAD_REQUEST,
        AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
    }
}

fn auth_error_response(err: &AuthError) -> Response {
    let status = auth_error_to_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "auth provider call failed");
    }
    (status, Json(serde_json::json!({ "error": err.user_message() }))).into_response()
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Caller whose session the provider vouches for.
/// Use as a handler parameter to require a signed-in user.
pub struct AuthUser {
    pub identity: ExternalIdentity,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;

        let app_state = AppState::from_ref(state);
        let identity = app_state
            .provider
            .session_identity(&token)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "session lookup failed");
                StatusCode::SERVICE_UNAVAILABLE
            })?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { identity, token })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub identity: ExternalIdentity,
}

fn session_response(state: &AppState, jar: CookieJar, session: Session) -> Response {
    let jar = jar.add(session_cookie(session.token.clone(), state.config.cookie_secure));
    let body = SessionResponse { token: session.token, identity: session.identity };
    (jar, Json(body)).into_response()
}

/// `POST /api/auth/sign-in`: exchange credentials for a session cookie.
pub async fn sign_in(State(state): State<AppState>, jar: CookieJar, Json(body): Json<Credentials>) -> Response {
    match state.provider.sign_in(&body).await {
        Ok(session) => {
            tracing::info!(external_id = %session.identity.external_id, "signed in");
            session_response(&state, jar, session)
        }
        Err(e) => auth_error_response(&e),
    }
}

/// `POST /api/auth/sign-up`: register with the provider and start a session.
///
/// The application user appears once the provider delivers the matching
/// `created` event; until then `/api/auth/me` returns identity fields only.
pub async fn sign_up(State(state): State<AppState>, jar: CookieJar, Json(body): Json<SignUpProfile>) -> Response {
    match state.provider.sign_up(&body).await {
        Ok(session) => {
            tracing::info!(external_id = %session.identity.external_id, "signed up");
            session_response(&state, jar, session)
        }
        Err(e) => auth_error_response(&e),
    }
}

/// `POST /api/auth/sign-out`: revoke the provider session, clear cookie.
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        if let Err(e) = state.provider.sign_out(&token).await {
            tracing::warn!(error = %e, "provider sign-out failed; clearing cookie anyway");
        }
    }

    let jar = CookieJar::new().add(cleared_session_cookie(state.config.cookie_secure));
    (jar, StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`: merged view of the caller, or `null` when signed out.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Option<MergedUserView>>, StatusCode> {
    let Some(token) = session_token(&headers) else {
        return Ok(Json(None));
    };

    let identity = state.provider.session_identity(&token).await.map_err(|e| {
        tracing::warn!(error = %e, "session lookup failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let view = state
        .coordinator
        .resolve_current_user(identity.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "current user resolution failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(view))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
