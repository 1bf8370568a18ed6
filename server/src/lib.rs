//! Exposes the router and state builders so integration tests can drive
//! the server in-process, the same way the binary's `main` does.

pub mod admin;
pub mod agent_handle;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logstore;
pub mod proxy;
pub mod registry;
pub mod session;
pub mod state;
pub mod tls;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthValidator;
use crate::config::{LogStoreKind, ServerConfig};
use crate::logstore::{LogStore, MemoryLogStore, SqliteLogStore};
use crate::registry::Registry;
use crate::state::AppState;

/// Builds the `AppState` a fully configured server runs with, the same
/// assembly `main` performs before serving.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let auth = match &config.auth_file {
        Some(path) => Some(Arc::new(AuthValidator::from_file(path)?)),
        None => None,
    };

    let log_store: Arc<dyn LogStore> = match config.log_store {
        LogStoreKind::Memory => Arc::new(MemoryLogStore::new(config.log_capacity)),
        LogStoreKind::Sqlite => {
            let path = config
                .log_db
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("--log-db is required when --log-store=sqlite"))?;
            Arc::new(SqliteLogStore::open(path)?)
        }
    };

    Ok(AppState {
        registry: Arc::new(Registry::new()),
        auth,
        log_store,
        domain: config.domain.clone(),
        enable_web_ui: config.enable_web_ui,
        max_body_bytes: config.max_body_bytes,
    })
}

/// Builds the Axum router. Shared between `main` and integration tests
/// so route wiring only lives in one place.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/connect", get(session::connect_handler))
        .route("/allow-host", get(api::allow_host))
        .route("/api/tunnels", get(api::list_tunnels))
        .route("/api/requests", get(api::list_requests))
        .route("/api/requests/stream", get(api::stream_requests))
        .fallback(proxy::dispatch)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
