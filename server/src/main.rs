//! # Tunnel Relay Server
//!
//! A WebSocket-based reverse HTTP tunnel: public clients hit a
//! subdomain, the server hands the request to whichever agent
//! registered for it over a persistent `/connect` channel, and relays
//! the agent's response back.
//!
//! ## Architecture
//!
//! ```text
//! Public client ──HTTP──► Proxy dispatcher ──WS──► Agent ──HTTP──► Origin service
//! ```
//!
//! Route wiring and state assembly live in the library crate so
//! integration tests can drive the same router this binary serves; see
//! [`tunnel_server::build_router`] and [`tunnel_server::build_state`].

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use tunnel_server::config::ServerConfig;
use tunnel_server::logstore::SqliteLogStore;
use tunnel_server::state::AppState;
use tunnel_server::{build_router, build_state, tls};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_server=info".into()),
        )
        .init();

    let config = ServerConfig::parse();
    if config.auth_file.is_none() {
        tracing::warn!("no --auth-file configured: /connect and the admin API accept every token");
    }
    let state = build_state(&config)?;

    if config.log_retention > 0 {
        spawn_retention_task(state.clone(), config.log_retention);
    }

    let app = build_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    if config.https {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("no rustls crypto provider installed yet");
        let tls_config = tls::server_config(state.clone());
        info!(%addr, domain = %config.domain, "tunnel-server listening (https, on-demand TLS)");
        axum_server::bind_rustls(addr, axum_server::tls_rustls::RustlsConfig::from_config(tls_config))
            .serve(app.into_make_service())
            .await?;
    } else {
        info!(%addr, domain = %config.domain, "tunnel-server listening (http)");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
    }

    Ok(())
}

/// Periodically purges rows older than `retention_days` from the SQLite
/// log store. A no-op (never spawned) for the in-memory backend, which
/// already bounds itself by capacity.
fn spawn_retention_task(state: AppState, retention_days: u32) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            if let Some(sqlite) = state.log_store.as_any().downcast_ref::<SqliteLogStore>() {
                match sqlite.purge_older_than(retention_days) {
                    Ok(deleted) if deleted > 0 => info!(deleted, "purged expired log entries"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "log retention purge failed"),
                }
            }
        }
    });
}
