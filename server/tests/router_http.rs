//! Router-level scenarios that don't need a live agent channel: host
//! classification, the `/connect` handshake's 400/401 paths, and
//! `/allow-host`. Driven with `tower::ServiceExt::oneshot` against the
//! same `Router` the binary serves, no socket required.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use tunnel_server::auth::AuthValidator;
use tunnel_server::build_router;
use tunnel_server::logstore::MemoryLogStore;
use tunnel_server::registry::Registry;
use tunnel_server::state::AppState;

fn state_with_auth(domain: &str, auth: Option<Arc<AuthValidator>>) -> AppState {
    AppState {
        registry: Arc::new(Registry::new()),
        auth,
        log_store: Arc::new(MemoryLogStore::new(100)),
        domain: domain.to_string(),
        enable_web_ui: false,
        max_body_bytes: 1024 * 1024,
    }
}

fn auth_file_with(token: &str, patterns: &[&str]) -> Arc<AuthValidator> {
    let path = std::env::temp_dir().join(format!("tunnel-server-authtest-{}.yaml", uuid::Uuid::new_v4()));
    let yaml = format!(
        "tokens:\n  - token: \"{}\"\n    subdomains: [{}]\n    role: \"user\"\n",
        token,
        patterns
            .iter()
            .map(|p| format!("\"{}\"", p))
            .collect::<Vec<_>>()
            .join(", ")
    );
    std::fs::write(&path, yaml).unwrap();
    let validator = AuthValidator::from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    Arc::new(validator)
}

#[tokio::test]
async fn unknown_subdomain_is_not_found() {
    let router = build_router(state_with_auth("example.com", None));
    let req = Request::builder()
        .uri("/")
        .header("host", "missing.example.com")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn host_outside_the_apex_is_not_found() {
    let router = build_router(state_with_auth("example.com", None));
    let req = Request::builder()
        .uri("/")
        .header("host", "evil.com")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connect_without_subdomain_is_bad_request() {
    let router = build_router(state_with_auth("example.com", None));
    let req = Request::builder()
        .uri("/connect")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connect_with_token_that_does_not_match_pattern_is_unauthorized() {
    let auth = auth_file_with("t1", &["project1-*"]);
    let router = build_router(state_with_auth("example.com", Some(auth)));
    let req = Request::builder()
        .uri("/connect?subdomain=project2-abc&token=t1")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn allow_host_permits_the_apex_and_rejects_unregistered_subdomains() {
    let router = build_router(state_with_auth("example.com", None));

    let apex_req = Request::builder()
        .uri("/allow-host?host=example.com")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let apex_resp = router.clone().oneshot(apex_req).await.unwrap();
    assert_eq!(apex_resp.status(), StatusCode::OK);

    let stray_req = Request::builder()
        .uri("/allow-host?host=ghost.example.com")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let stray_resp = router.oneshot(stray_req).await.unwrap();
    assert_eq!(stray_resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_api_is_unauthenticated_with_no_auth_file_configured() {
    let router = build_router(state_with_auth("example.com", None));
    let req = Request::builder()
        .uri("/api/tunnels")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
