//! # On-Demand TLS
//!
//! A `rustls` certificate resolver that issues a fresh self-signed leaf
//! per SNI hostname the first time it's seen, gated by
//! [`AppState::allow_host`]. Certificates are cached for the life of
//! the process — there is no ACME integration here, just enough to let
//! `--https` terminate TLS for the apex and every live subdomain
//! without a manual cert per tunnel.

use std::sync::Arc;

use dashmap::DashMap;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey as RustlsCertifiedKey;
use rustls::ServerConfig;
use tracing::{info, warn};

use crate::state::AppState;

/// Resolves a `rustls` certificate per SNI name, minting and caching a
/// self-signed one on first use if [`AppState::allow_host`] permits it.
pub struct OnDemandResolver {
    state: AppState,
    cache: DashMap<String, Arc<RustlsCertifiedKey>>,
}

impl OnDemandResolver {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            cache: DashMap::new(),
        }
    }

    fn issue(&self, host: &str) -> Option<Arc<RustlsCertifiedKey>> {
        if let Some(existing) = self.cache.get(host) {
            return Some(existing.clone());
        }
        if !self.state.allow_host(host) {
            warn!(%host, "refusing to issue certificate for disallowed host");
            return None;
        }

        let CertifiedKey { cert, signing_key } =
            generate_simple_self_signed(vec![host.to_string()]).ok()?;
        let key = rustls::pki_types::PrivateKeyDer::Pkcs8(signing_key.serialize_der().into());
        let signing_key = rustls::crypto::ring::sign::any_ecdsa_type(&key).ok()?;
        let certified = Arc::new(RustlsCertifiedKey::new(vec![cert.der().clone()], signing_key));

        self.cache.insert(host.to_string(), certified.clone());
        info!(%host, "issued on-demand self-signed certificate");
        Some(certified)
    }
}

impl std::fmt::Debug for OnDemandResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDemandResolver").finish()
    }
}

impl ResolvesServerCert for OnDemandResolver {
    fn resolve(&self, client_hello: ClientHello) -> Option<Arc<RustlsCertifiedKey>> {
        let host = client_hello.server_name()?;
        self.issue(host)
    }
}

/// Builds the `rustls::ServerConfig` used by `axum-server` when
/// `--https` is set.
pub fn server_config(state: AppState) -> Arc<ServerConfig> {
    let resolver = Arc::new(OnDemandResolver::new(state));
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}
