//! # Tunnel Agent
//!
//! Connects to a tunnel server's `/connect` endpoint, registers for a
//! subdomain, and relays each inbound `TunnelRequest` to a local origin
//! service via `reqwest`, returning the correlated `TunnelResponse`.
//!
//! ## Modules
//!
//! - [`config`] — CLI flags
//! - [`relay`]  — connection loop, reconnect, and per-request relay

mod config;
mod relay;

use clap::Parser;

use crate::config::AgentConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_agent=info".into()),
        )
        .init();

    let config = AgentConfig::parse();
    relay::run_agent_loop(config).await;
}
