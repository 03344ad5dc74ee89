//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the startup config, the sync coordinator (reads go straight to it),
//! the event dispatcher (writes go through it for per-identity ordering), and
//! the auth provider.

use std::sync::Arc;

use crate::config::Config;
use crate::services::dispatch::EventDispatcher;
use crate::services::provider::AuthProvider;
use crate::services::sync::SyncCoordinator;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: Arc<SyncCoordinator>,
    pub dispatcher: EventDispatcher,
    pub provider: Arc<dyn AuthProvider>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        coordinator: Arc<SyncCoordinator>,
        dispatcher: EventDispatcher,
        provider: Arc<dyn AuthProvider>,
    ) -> Self {
        Self { config, coordinator, dispatcher, provider }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;
