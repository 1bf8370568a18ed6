//! # Admin Web UI
//!
//! A single embedded HTML page served at the apex host when
//! `--enable-web-ui` is set. Lists live tunnels and tails the request
//! log by polling the JSON admin endpoints in `api.rs`. Kept as one
//! `include_str!`-ed file rather than a `tower-http` static directory
//! since there's exactly one page to serve.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Renders the admin UI at the apex host, or 404s if it's disabled.
pub fn render_index(state: &AppState) -> Response {
    if !state.enable_web_ui {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(INDEX_HTML).into_response()
}
