//! # Agent CLI Configuration
//!
//! Command-line flags for `tunnel-agent`, parsed with `clap`'s derive
//! API.

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "tunnel-agent", version, about = "Reverse HTTP tunnel agent")]
pub struct AgentConfig {
    /// WebSocket URL of the tunnel server's `/connect` endpoint, e.g.
    /// "wss://example.com/connect".
    #[arg(long)]
    pub server: String,

    /// Subdomain to register for, e.g. "myapp" for myapp.example.com.
    #[arg(long)]
    pub subdomain: String,

    /// Hostname of the local origin service to relay requests to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the local origin service.
    #[arg(long)]
    pub port: u16,

    /// Bearer token presented to the server at connect time.
    #[arg(long, env = "TUNNEL_AUTH_TOKEN", default_value = "")]
    pub auth_token: String,
}

impl AgentConfig {
    /// The full `/connect` URL with `subdomain` and `token` query
    /// parameters appended.
    pub fn connect_url(&self) -> String {
        let mut url = format!("{}?subdomain={}", self.server, self.subdomain);
        if !self.auth_token.is_empty() {
            url.push_str("&token=");
            url.push_str(&self.auth_token);
        }
        url
    }

    /// The base URL of the local origin service a relayed request is
    /// forwarded to.
    pub fn origin_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
