//! Auth provider client for credential flows and session lookup against the
//! external identity provider.
//!
//! SYSTEM CONTEXT
//! ==============
//! Credentials never touch this crate's storage: they are forwarded to the
//! provider, which owns password hashing and token issuance. What comes back
//! is an opaque session token plus the provider's view of the identity.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::Config;
use crate::identity::ExternalIdentity;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpProfile {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Session issued by the provider.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub identity: ExternalIdentity,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Rejected(String),
    #[error("auth provider unavailable: {0}")]
    Provider(String),
}

impl AuthError {
    /// Message safe to show the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(_) => "Sign-in is temporarily unavailable. Please try again.".to_owned(),
            other => other.to_string(),
        }
    }
}

/// The operations the UI layer consumes, backed by the provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    async fn sign_up(&self, profile: &SignUpProfile) -> Result<Session, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    /// Identity behind a session token, `None` if the session is unknown,
    /// expired, or its identity was deleted.
    async fn session_identity(&self, token: &str) -> Result<Option<ExternalIdentity>, AuthError>;
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUser {
    id: String,
    email: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl From<ProviderUser> for ExternalIdentity {
    fn from(user: ProviderUser) -> Self {
        Self {
            external_id: user.id,
            email: user.email,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    token: String,
    user: ProviderUser,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    user: ProviderUser,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
}

fn name_from_email(email: &str) -> &str {
    email
        .split('@')
        .next()
        .filter(|local| !local.trim().is_empty())
        .unwrap_or("user")
}

/// Map a non-success provider response to an `AuthError`.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<ProviderErrorBody>(body)
        .unwrap_or_default()
        .message
        .filter(|m| !m.trim().is_empty());

    match status {
        StatusCode::UNAUTHORIZED => AuthError::InvalidCredentials,
        s if s.is_client_error() => AuthError::Rejected(message.unwrap_or_else(|| "request rejected".to_owned())),
        s => AuthError::Provider(format!("{s}: {}", message.as_deref().unwrap_or(body))),
    }
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// Provider client speaking the provider's `/api/auth/*` HTTP API.
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(Self { http, base_url: config.provider_url.clone() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/auth/{path}", self.base_url)
    }

    async fn post_credentials<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<Session, AuthError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| AuthError::Provider(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        let parsed: SignInResponse = serde_json::from_str(&text)
            .map_err(|_| AuthError::Provider(format!("unexpected response: {text}")))?;
        Ok(Session { token: parsed.token, identity: parsed.user.into() })
    }
}

#[async_trait]
impl AuthProvider for ProviderClient {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let body = SignInRequest { email: &credentials.email, password: &credentials.password };
        self.post_credentials("sign-in/email", &body).await
    }

    async fn sign_up(&self, profile: &SignUpProfile) -> Result<Session, AuthError> {
        let name = profile
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name_from_email(&profile.email));
        let body = SignUpRequest { email: &profile.email, password: &profile.password, name };
        self.post_credentials("sign-up/email", &body).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let resp = self
            .http
            .post(self.url("sign-out"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = resp.status();
        // An already-invalid session is as signed out as it gets.
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(classify_failure(status, &text))
    }

    async fn session_identity(&self, token: &str) -> Result<Option<ExternalIdentity>, AuthError> {
        let resp = self
            .http
            .get(self.url("get-session"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = resp.text().await.map_err(|e| AuthError::Provider(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        parse_session_body(&text)
    }
}

/// The provider answers `null` for an unknown session.
pub(crate) fn parse_session_body(text: &str) -> Result<Option<ExternalIdentity>, AuthError> {
    let parsed: Option<SessionResponse> = serde_json::from_str(text)
        .map_err(|_| AuthError::Provider(format!("unexpected session response: {text}")))?;
    Ok(parsed.map(|s| s.user.into()))
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;
