//! # Agent Session
//!
//! The `/connect` upgrade endpoint and the read loop that runs for the
//! lifetime of one agent's channel. Mirrors the teacher's
//! `handle_connection`: split the socket, spawn a dedicated writer
//! task fed by an unbounded queue, and run the read side on the
//! current task until it errors or the peer closes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::agent_handle::AgentHandle;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub subdomain: Option<String>,
    #[serde(default)]
    pub token: String,
}

/// `GET /connect?subdomain=<s>&token=<t>` — upgrades to a WebSocket and
/// starts an agent session once the subdomain is present and the token
/// authorizes it.
pub async fn connect_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let Some(subdomain) = query.subdomain.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing subdomain").into_response();
    };

    if !state.authorize_subdomain(&query.token, &subdomain) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    ws.on_upgrade(move |socket| run_session(socket, state, subdomain))
}

/// Runs one agent session for the duration of `socket`'s lifetime:
/// publish the handle, read `TunnelResponse` frames until the channel
/// dies, then unregister.
async fn run_session(socket: WebSocket, state: AppState, subdomain: String) {
    info!(%subdomain, "agent session starting");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = writer_rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let handle = Arc::new(AgentHandle::new(subdomain.clone(), writer_tx));
    state.registry.register(subdomain.clone(), handle.clone());

    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(response) => handle.deliver_response(response),
                Err(e) => {
                    warn!(%subdomain, error = %e, "malformed tunnel response frame, terminating session");
                    break;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                error!(%subdomain, error = %e, "read error, terminating session");
                break;
            }
        }
    }

    handle.close();
    state.registry.remove_if_current(&subdomain, &handle);
    writer_task.abort();
    info!(%subdomain, "agent session ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_query_defaults_token_to_empty() {
        let q: ConnectQuery = serde_urlencoded::from_str("subdomain=myapp").unwrap();
        assert_eq!(q.subdomain.as_deref(), Some("myapp"));
        assert_eq!(q.token, "");
    }
}
