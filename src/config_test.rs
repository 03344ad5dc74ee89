use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn minimal() -> Vec<(&'static str, &'static str)> {
    vec![("DATABASE_URL", "postgres://localhost/bridge"), ("AUTH_PROVIDER_SECRET", "s3cret")]
}

// =============================================================================
// Required values
// =============================================================================

#[test]
fn minimal_env_uses_defaults() {
    let config = Config::from_lookup(lookup_from(&minimal())).unwrap();
    assert_eq!(config.database_url, "postgres://localhost/bridge");
    assert_eq!(config.provider_secret, "s3cret");
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.provider_url, DEFAULT_PROVIDER_URL);
    assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    assert_eq!(config.store_timeout, Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));
    assert_eq!(config.provider_timeout, Duration::from_millis(DEFAULT_PROVIDER_TIMEOUT_MS));
    assert_eq!(config.sync_workers, DEFAULT_SYNC_WORKERS);
    assert_eq!(config.sync_queue_capacity, DEFAULT_SYNC_QUEUE_CAPACITY);
    assert!(!config.cookie_secure);
}

#[test]
fn missing_database_url_is_error() {
    let err = Config::from_lookup(lookup_from(&[("AUTH_PROVIDER_SECRET", "x")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
}

#[test]
fn blank_secret_counts_as_missing() {
    let err = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://db"), ("AUTH_PROVIDER_SECRET", "   ")]))
        .unwrap_err();
    assert_eq!(err, ConfigError::Missing("AUTH_PROVIDER_SECRET"));
}

#[test]
fn invalid_port_is_error() {
    let mut pairs = minimal();
    pairs.push(("PORT", "eighty"));
    let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
}

// =============================================================================
// Provider URL
// =============================================================================

#[test]
fn provider_url_falls_back_to_site_url() {
    let mut pairs = minimal();
    pairs.push(("SITE_URL", "https://app.example.com/"));
    let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(config.provider_url, "https://app.example.com");
    assert!(config.cookie_secure, "https provider implies secure cookies");
}

#[test]
fn provider_url_prefers_explicit_value() {
    let mut pairs = minimal();
    pairs.push(("SITE_URL", "https://site.example.com"));
    pairs.push(("AUTH_PROVIDER_URL", "http://auth.internal:4000"));
    let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(config.provider_url, "http://auth.internal:4000");
}

#[test]
fn provider_url_without_scheme_is_error() {
    let mut pairs = minimal();
    pairs.push(("AUTH_PROVIDER_URL", "auth.internal"));
    let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "AUTH_PROVIDER_URL", .. }));
}

#[test]
fn cookie_secure_explicit_overrides_inference() {
    let mut pairs = minimal();
    pairs.push(("AUTH_PROVIDER_URL", "https://auth.example.com"));
    pairs.push(("COOKIE_SECURE", "off"));
    let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
    assert!(!config.cookie_secure);
}

// =============================================================================
// Tuning knobs
// =============================================================================

#[test]
fn unparsable_numbers_fall_back_to_defaults() {
    let mut pairs = minimal();
    pairs.push(("SYNC_WORKERS", "many"));
    pairs.push(("STORE_TIMEOUT_MS", "-1"));
    let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(config.sync_workers, DEFAULT_SYNC_WORKERS);
    assert_eq!(config.store_timeout, Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));
}

#[test]
fn zero_workers_clamped_to_one() {
    let mut pairs = minimal();
    pairs.push(("SYNC_WORKERS", "0"));
    pairs.push(("SYNC_QUEUE_CAPACITY", "0"));
    let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(config.sync_workers, 1);
    assert_eq!(config.sync_queue_capacity, 1);
}

#[test]
fn debug_redacts_secrets() {
    let config = Config::from_lookup(lookup_from(&minimal())).unwrap();
    let debug = format!("{config:?}");
    assert!(!debug.contains("s3cret"));
    assert!(!debug.contains("postgres://"));
    assert!(debug.contains("<redacted>"));
}

// =============================================================================
// parse_bool
// =============================================================================

#[test]
fn parse_bool_variants() {
    for val in ["1", "true", "YES", " on "] {
        assert_eq!(parse_bool(Some(val)), Some(true), "expected true for {val:?}");
    }
    for val in ["0", "False", "no", "OFF"] {
        assert_eq!(parse_bool(Some(val)), Some(false), "expected false for {val:?}");
    }
    assert_eq!(parse_bool(Some("maybe")), None);
    assert_eq!(parse_bool(Some("")), None);
    assert_eq!(parse_bool(None), None);
}
