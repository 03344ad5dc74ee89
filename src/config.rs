//! Process configuration.
//!
//! DESIGN
//! ======
//! Everything the bridge needs from the environment is read exactly once at
//! startup into [`Config`], which is then shared behind an `Arc`. Nothing
//! downstream calls `std::env::var` on the request path.

use std::fmt;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PROVIDER_URL: &str = "http://localhost:3000";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SYNC_WORKERS: usize = 8;
const DEFAULT_SYNC_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Startup configuration for the server and the sync bridge.
#[derive(Clone)]
pub struct Config {
    /// Postgres connection string for the application store.
    pub database_url: String,
    /// HTTP listen port.
    pub port: u16,
    /// Base URL of the external auth provider.
    pub provider_url: String,
    /// Shared secret the provider presents when delivering lifecycle events.
    pub provider_secret: String,
    pub db_max_connections: u32,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Upper bound on any single provider HTTP call.
    pub provider_timeout: Duration,
    /// Number of event dispatch shards.
    pub sync_workers: usize,
    /// Queue depth per dispatch shard.
    pub sync_queue_capacity: usize,
    /// Whether session cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"<redacted>")
            .field("port", &self.port)
            .field("provider_url", &self.provider_url)
            .field("provider_secret", &"<redacted>")
            .field("db_max_connections", &self.db_max_connections)
            .field("store_timeout", &self.store_timeout)
            .field("provider_timeout", &self.provider_timeout)
            .field("sync_workers", &self.sync_workers)
            .field("sync_queue_capacity", &self.sync_queue_capacity)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl Config {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. `from_env` is this with `std::env::var`.
    ///
    /// Required: `DATABASE_URL`, `AUTH_PROVIDER_SECRET`.
    /// `AUTH_PROVIDER_URL` falls back to `SITE_URL`, then to localhost.
    /// Numeric tuning knobs fall back to their defaults when unparsable.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let provider_secret = required(&lookup, "AUTH_PROVIDER_SECRET")?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let provider_url = lookup("AUTH_PROVIDER_URL")
            .or_else(|| lookup("SITE_URL"))
            .map(|url| url.trim().trim_end_matches('/').to_owned())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_owned());
        if !(provider_url.starts_with("http://") || provider_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { key: "AUTH_PROVIDER_URL", value: provider_url });
        }

        let cookie_secure =
            parse_bool(lookup("COOKIE_SECURE").as_deref()).unwrap_or_else(|| provider_url.starts_with("https://"));

        Ok(Self {
            database_url,
            port,
            provider_secret,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            store_timeout: Duration::from_millis(parse_or(&lookup, "STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS)),
            provider_timeout: Duration::from_millis(parse_or(
                &lookup,
                "PROVIDER_TIMEOUT_MS",
                DEFAULT_PROVIDER_TIMEOUT_MS,
            )),
            sync_workers: parse_or(&lookup, "SYNC_WORKERS", DEFAULT_SYNC_WORKERS).max(1),
            sync_queue_capacity: parse_or(&lookup, "SYNC_QUEUE_CAPACITY", DEFAULT_SYNC_QUEUE_CAPACITY).max(1),
            provider_url,
            cookie_secure,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn parse_bool(raw: Option<&str>) -> Option<bool> {
    raw.and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
