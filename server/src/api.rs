//! # Admin API
//!
//! JSON endpoints backing the admin web UI: the live tunnel list, the
//! recent request log, and an SSE stream of new entries as they land.
//! Every route here is gated by [`AppState::is_admin`] — with no
//! `--auth-file` configured that's always true, matching `/connect`.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use crate::logstore::LogEntry;
use crate::state::AppState;

const AUTH_TOKEN_HEADER: &str = "x-auth-token";

#[derive(Deserialize, Default)]
pub struct AdminQuery {
    #[serde(default)]
    pub token: String,
}

/// Admin requests carry their token either in `X-Auth-Token` or in a
/// `?token=` query parameter; the header takes precedence.
fn admin_token(headers: &axum::http::HeaderMap, query_token: &str) -> String {
    headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| query_token.to_string())
}

#[derive(Serialize)]
pub struct TunnelListItem {
    pub subdomain: String,
}

/// `GET /api/tunnels` — the set of currently connected subdomains.
pub async fn list_tunnels(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    if !state.is_admin(&admin_token(&headers, &query.token)) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let tunnels: Vec<TunnelListItem> = state
        .registry
        .list_subdomains()
        .into_iter()
        .map(|subdomain| TunnelListItem { subdomain })
        .collect();
    Json(tunnels).into_response()
}

/// `GET /api/requests` — the log store's current contents, oldest first.
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    if !state.is_admin(&admin_token(&headers, &query.token)) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.log_store.all()).into_response()
}

#[derive(Deserialize)]
pub struct AllowHostQuery {
    pub host: String,
}

/// `GET /allow-host?host=<h>` — backs on-demand TLS certificate
/// issuance: 200 if `host` may receive a certificate, 403 otherwise.
pub async fn allow_host(
    State(state): State<AppState>,
    Query(query): Query<AllowHostQuery>,
) -> StatusCode {
    if state.allow_host(&query.host) {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    }
}

/// `GET /api/requests/stream` — Server-Sent Events of newly logged
/// requests. Lossy: a slow client sees a gap, not a stall.
pub async fn stream_requests(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    if !state.is_admin(&admin_token(&headers, &query.token)) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let stream = BroadcastStream::new(state.log_store.subscribe())
        .filter_map(|item| async move { item.ok().map(|entry| Ok::<Event, Infallible>(sse_event(&entry))) });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

fn sse_event(entry: &LogEntry) -> Event {
    match serde_json::to_string(entry) {
        Ok(json) => Event::default().data(json),
        Err(_) => Event::default().data("{}"),
    }
}
