//! # Proxy Dispatcher
//!
//! The fallback handler invoked for every request that isn't one of the
//! fixed control/admin routes. Resolves `Host` to a subdomain, looks the
//! subdomain up in the [`Registry`](crate::registry::Registry), frames a
//! [`TunnelRequest`], and waits up to 30 seconds for the correlated
//! [`TunnelResponse`].

use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;
use tunnel_protocol::{join_header_values, split_header_value, Headers, TunnelRequest};
use uuid::Uuid;

use crate::admin;
use crate::agent_handle::RendezvousSlot;
use crate::error::DispatchError;
use crate::logstore::{now_unix, LogEntry};
use crate::state::AppState;

/// Dispatcher's per-request deadline, per the design doc.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Awaits a rendezvous slot up to `deadline`. `Err` covers both a
/// deadline expiry and the sender having been dropped without ever
/// delivering (the terminated-session case); either way the caller's
/// only remaining job is to abandon the slot and respond `504`.
async fn await_rendezvous(
    slot: RendezvousSlot,
    deadline: Duration,
) -> Result<tunnel_protocol::TunnelResponse, ()> {
    match tokio::time::timeout(deadline, slot).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) | Err(_) => Err(()),
    }
}

/// Which way a request should be routed once the host is classified.
enum RouteTarget {
    /// `Host == apex`: admin/UI territory, not the tunnel.
    Apex,
    /// `Host` ends with `.<apex>`: the subdomain to proxy to.
    Subdomain(String),
    /// `Host` doesn't end with the apex at all.
    NotFound,
}

fn classify_host(host: &str, apex: &str) -> RouteTarget {
    if host == apex {
        return RouteTarget::Apex;
    }
    match host.strip_suffix(&format!(".{}", apex)) {
        Some(sub) if !sub.is_empty() => RouteTarget::Subdomain(sub.to_string()),
        _ => RouteTarget::NotFound,
    }
}

fn host_without_port(req: &Request<Body>) -> Option<String> {
    let raw = req.headers().get(axum::http::header::HOST)?.to_str().ok()?;
    Some(raw.rsplit_once(':').map(|(h, _)| h).unwrap_or(raw).to_string())
}

/// Flattens an `http::HeaderMap` into the wire's single-value shape.
fn flatten_headers(headers: &HeaderMap) -> Headers {
    let mut flat = Headers::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        flat.insert(name.as_str().to_string(), join_header_values(name.as_str(), values.into_iter()));
    }
    flat
}

/// Expands the wire's flattened header shape back into an
/// `http::HeaderMap`, re-splitting `Set-Cookie` into distinct headers.
fn unflatten_headers(flat: &Headers) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in flat {
        let Ok(header_name) = HeaderName::try_from(name.as_str()) else {
            continue;
        };
        for part in split_header_value(name, value) {
            if let Ok(header_value) = HeaderValue::from_str(part) {
                headers.append(header_name.clone(), header_value);
            }
        }
    }
    headers
}

/// The Axum fallback: handles the apex host, unknown hosts, and proxied
/// subdomain requests all in one place, since routing here depends on
/// `Host`, not just the path.
pub async fn dispatch(State(state): State<AppState>, req: Request<Body>) -> Response {
    let Some(host) = host_without_port(&req) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match classify_host(&host, &state.domain) {
        RouteTarget::Apex => admin::render_index(&state),
        RouteTarget::NotFound => StatusCode::NOT_FOUND.into_response(),
        RouteTarget::Subdomain(subdomain) => proxy_to_subdomain(state, subdomain, req).await,
    }
}

async fn proxy_to_subdomain(state: AppState, subdomain: String, req: Request<Body>) -> Response {
    let Some(handle) = state.registry.lookup(&subdomain) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let headers = flatten_headers(req.headers());

    let body_bytes = match axum::body::to_bytes(req.into_body(), state.max_body_bytes).await {
        Ok(b) => b,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response(),
    };

    let request_id = Uuid::new_v4().to_string();
    let tunnel_request = TunnelRequest {
        id: request_id.clone(),
        method: method.clone(),
        path: path.clone(),
        headers,
        body: body_bytes.to_vec(),
    };

    let slot = match handle.enqueue_request(tunnel_request) {
        Ok(slot) => slot,
        Err(DispatchError::ChannelWrite(reason)) => {
            warn!(%subdomain, %request_id, %reason, "tunnel write failed");
            return (StatusCode::BAD_GATEWAY, "tunnel write error").into_response();
        }
        Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
    };

    match await_rendezvous(slot, DISPATCH_TIMEOUT).await {
        Ok(tunnel_response) => {
            let status = StatusCode::from_u16(tunnel_response.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let response_headers = unflatten_headers(&tunnel_response.headers);

            state.log_store.append(LogEntry {
                id: request_id,
                subdomain,
                method,
                path,
                status: tunnel_response.status,
                headers: tunnel_response.headers.clone(),
                body: String::from_utf8_lossy(&tunnel_response.body).to_string(),
                timestamp: now_unix(),
            });

            let mut response = Response::builder().status(status);
            *response.headers_mut().unwrap() = response_headers;
            response.body(Body::from(tunnel_response.body)).unwrap()
        }
        Err(()) => {
            handle.abandon(&request_id);
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_apex_host() {
        matches!(classify_host("example.com", "example.com"), RouteTarget::Apex);
    }

    #[test]
    fn classify_subdomain_host() {
        match classify_host("myapp.example.com", "example.com") {
            RouteTarget::Subdomain(s) => assert_eq!(s, "myapp"),
            _ => panic!("expected subdomain"),
        }
    }

    #[test]
    fn classify_unrelated_host_is_not_found() {
        matches!(
            classify_host("evil.com", "example.com"),
            RouteTarget::NotFound
        );
    }

    #[test]
    fn classify_rejects_bare_apex_suffix_without_label() {
        // "example.com" itself shouldn't be treated as subdomain "" of
        // ".example.com" — it must hit the Apex arm via exact match, and
        // a host like ".example.com" with an empty label is not-found.
        match classify_host(".example.com", "example.com") {
            RouteTarget::NotFound => {}
            _ => panic!("empty subdomain label must not resolve"),
        }
    }

    #[tokio::test]
    async fn await_rendezvous_times_out_when_nothing_is_sent() {
        let (_tx, rx) = tokio::sync::oneshot::channel::<tunnel_protocol::TunnelResponse>();
        let result = await_rendezvous(rx, Duration::from_millis(20)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn await_rendezvous_returns_the_delivered_response() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        tx.send(tunnel_protocol::TunnelResponse {
            id: "1".to_string(),
            status: 200,
            headers: Headers::new(),
            body: b"pong".to_vec(),
        })
        .unwrap();
        let result = await_rendezvous(rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(result.body, b"pong");
    }

    #[tokio::test]
    async fn await_rendezvous_errors_when_sender_is_dropped() {
        let (tx, rx) = tokio::sync::oneshot::channel::<tunnel_protocol::TunnelResponse>();
        drop(tx);
        let result = await_rendezvous(rx, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[test]
    fn header_round_trip_flattens_and_splits_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.append("x-trace", HeaderValue::from_static("abc"));

        let flat = flatten_headers(&headers);
        assert_eq!(flat.get("set-cookie").unwrap(), "a=1\nb=2");
        assert_eq!(flat.get("x-trace").unwrap(), "abc");

        let back = unflatten_headers(&flat);
        let cookies: Vec<_> = back.get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
    }
}
