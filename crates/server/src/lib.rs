//! Duplex Chat Server Library
//!
//! Two-party chat: auth, SQLite message storage, sha2-addressed media
//! blobs, and live presence/message delivery over per-client WebSockets.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod media;
pub mod presence;
pub mod registry;
pub mod store;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::middleware::mw_require_auth;
use auth::AuthManager;
use config::{AppState, ServerConfig};
use delivery::DeliveryRouter;
use handlers::{
    get_blob, get_history, list_contacts, login, logout, me, send_message, signup, update_profile,
};
use media::{BlobStore, MediaStore};
use presence::PresenceBroadcaster;
use registry::ConnectionRegistry;
use store::{MessageStore, SqliteStore};
use ws::ws_handler;

pub async fn run() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "server=debug,info".into()),
        )
        .finish();
    // A second init (tests, embedding) keeps the existing subscriber
    let _ = tracing::subscriber::set_global_default(subscriber);

    info!("=== Duplex Chat Server ===");

    let config = ServerConfig::from_env();
    config.ensure_dirs().await?;
    info!("Storage directory: {:?}", config.data_dir);

    let options = SqliteConnectOptions::new()
        .filename(config.db_path())
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    let auth = Arc::new(AuthManager::new(pool.clone(), config.session_ttl_days).await?);
    info!("Auth Manager initialized");

    let store: Arc<dyn MessageStore> = Arc::new(SqliteStore::new(pool).await?);
    info!("SQLite message store initialized");

    let media: Arc<dyn MediaStore> = Arc::new(BlobStore::new(config.blob_dir.clone()));
    let registry = Arc::new(ConnectionRegistry::new());
    let presence = Arc::new(PresenceBroadcaster::new(registry.clone()));
    let delivery = Arc::new(DeliveryRouter::new(
        store.clone(),
        media.clone(),
        registry.clone(),
    ));

    let state = AppState {
        auth,
        store,
        media,
        registry,
        presence,
        delivery,
    };

    let port = config.port;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Duplex chat server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the full application router over the given state.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/update-profile", put(update_profile))
        .route("/messages/users", get(list_contacts))
        .route("/messages/send/{receiver_id}", post(send_message))
        .route("/messages/{peer_id}", get(get_history))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            mw_require_auth,
        ));

    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .merge(protected)
        .route("/blobs/{hash}", get(get_blob))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK - Duplex Chat Server"
}
