//! # Shared Application State
//!
//! Holds everything passed to every Axum handler via `.with_state(...)`:
//! the agent registry, the optional auth validator, the log store, and
//! the handful of settings that change routing/proxy behavior. Built
//! once in `main.rs` from a [`ServerConfig`](crate::config::ServerConfig)
//! and cloned (cheaply — every field is an `Arc`) into each handler.

use std::sync::Arc;

use crate::auth::AuthValidator;
use crate::logstore::LogStore;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    /// `None` means no `--auth-file` was configured: `/connect` and the
    /// admin API are both open to anyone.
    pub auth: Option<Arc<AuthValidator>>,
    pub log_store: Arc<dyn LogStore>,
    /// Apex domain, e.g. "example.com".
    pub domain: String,
    pub enable_web_ui: bool,
    pub max_body_bytes: usize,
}

impl AppState {
    /// True iff `token` carries the `"admin"` role. When no auth file is
    /// configured, the admin API is unauthenticated, consistent with
    /// `/connect` accepting every token in that mode.
    pub fn is_admin(&self, token: &str) -> bool {
        match &self.auth {
            Some(validator) => validator.has_role(token, "admin"),
            None => true,
        }
    }

    /// True iff `token` is authorized to register as `subdomain`. When no
    /// auth file is configured every token is authorized.
    pub fn authorize_subdomain(&self, token: &str, subdomain: &str) -> bool {
        match &self.auth {
            Some(validator) => validator.validate(token, subdomain),
            None => true,
        }
    }

    /// True iff `host` may be issued a certificate: it is the apex, or a
    /// currently-registered subdomain of it. Backs `/allow-host`.
    pub fn allow_host(&self, host: &str) -> bool {
        if host == self.domain {
            return true;
        }
        match host.strip_suffix(&format!(".{}", self.domain)) {
            Some(sub) => self.registry.lookup(sub).is_some(),
            None => false,
        }
    }
}
