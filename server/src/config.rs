//! # Server CLI Configuration
//!
//! Command-line flags for `tunnel-server`, parsed with `clap`'s derive
//! API. Kept separate from `main.rs` so handlers and tests can build an
//! `AppState` from a hand-built `ServerConfig` without going through
//! argument parsing.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which backend stores the audit log of proxied requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum LogStoreKind {
    /// Fixed-capacity in-memory ring buffer. Lost on restart.
    Memory,
    /// SQLite-backed store with optional retention.
    Sqlite,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "tunnel-server", version, about = "Reverse HTTP tunnel relay server")]
pub struct ServerConfig {
    /// Port to listen on for public HTTP (or HTTPS, with --https) traffic.
    #[arg(long, default_value_t = 7070)]
    pub port: u16,

    /// Apex domain that subdomains are served under, e.g. "example.com".
    #[arg(long)]
    pub domain: String,

    /// Path to a YAML auth file. If unset, all tokens are accepted and
    /// `/connect` never returns 401.
    #[arg(long)]
    pub auth_file: Option<PathBuf>,

    /// Serve the public side over HTTPS with on-demand self-signed
    /// certificates, gated by the host-allowlist callback.
    #[arg(long, default_value_t = false)]
    pub https: bool,

    /// Contact address recorded alongside issued certificates. Kept
    /// under its original name for continuity with Caddy-based setups.
    #[arg(long)]
    pub caddy_email: Option<String>,

    /// Serve the embedded admin single-page app at the apex host.
    #[arg(long, default_value_t = false)]
    pub enable_web_ui: bool,

    /// Audit log backend.
    #[arg(long, value_enum, default_value_t = LogStoreKind::Memory)]
    pub log_store: LogStoreKind,

    /// SQLite database path (only used when --log-store=sqlite).
    #[arg(long)]
    pub log_db: Option<PathBuf>,

    /// Retention window in days for the SQLite log store. 0 = forever.
    #[arg(long, default_value_t = 0)]
    pub log_retention: u32,

    /// Ring buffer capacity for the in-memory log store.
    #[arg(long, default_value_t = 1000)]
    pub log_capacity: usize,

    /// Maximum request body size accepted from public clients, in bytes.
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub max_body_bytes: usize,
}
