use std::sync::Arc;

use identity_bridge::config::Config;
use identity_bridge::services::dispatch::{self, EventDispatcher};
use identity_bridge::services::provider::ProviderClient;
use identity_bridge::services::sync::SyncCoordinator;
use identity_bridge::state::AppState;
use identity_bridge::store::postgres::PgStore;
use identity_bridge::{db, routes};

#[tokio::main]
async fn main() {
    // .env is optional.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = Arc::new(Config::from_env().expect("invalid configuration"));
    tracing::info!(?config, "configuration loaded");

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");
    let store = Arc::new(PgStore::new(pool, config.store_timeout));

    let coordinator = Arc::new(SyncCoordinator::new(store.clone(), store));
    let (dispatcher, workers) =
        EventDispatcher::spawn(coordinator.clone(), config.sync_workers, config.sync_queue_capacity);
    dispatch::watch_shards(workers);
    let provider = Arc::new(ProviderClient::new(&config).expect("auth provider client init failed"));

    let port = config.port;
    let state = AppState::new(config, coordinator, dispatcher, provider);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "identity bridge listening");
    axum::serve(listener, app).await.expect("server failed");
}
