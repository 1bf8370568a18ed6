//! # Agent Connection Loop and HTTP Relay
//!
//! Mirrors the teacher's `run_agent_loop`: connect, spawn a dedicated
//! outbound writer task, run the inbound loop until the socket dies,
//! then reconnect after a fixed delay. Each inbound `TunnelRequest`
//! spawns its own relay task rather than being multiplexed over a TCP
//! stream table, since there is exactly one kind of payload here — a
//! whole HTTP request/response pair — not an arbitrary byte stream.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use tunnel_protocol::{TunnelRequest, TunnelResponse};

use crate::config::AgentConfig;

/// How long to wait before attempting to reconnect after a disconnect.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Runs the agent's connection loop forever: connect, relay, reconnect.
pub async fn run_agent_loop(config: AgentConfig) {
    let http = Client::new();

    loop {
        info!(url = %config.server, "connecting to tunnel server");
        match connect_async(config.connect_url()).await {
            Ok((ws_stream, _)) => {
                info!("tunnel channel established");
                run_session(ws_stream, &config, &http).await;
                warn!("tunnel channel closed");
            }
            Err(e) => {
                error!(error = %e, "connect failed");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_session<S>(ws_stream: S, config: &AgentConfig, http: &Client)
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin
        + Send
        + 'static,
{
    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = writer_rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<TunnelRequest>(&text) {
                Ok(request) => {
                    let origin_base = config.origin_base();
                    let http = http.clone();
                    let writer_tx = writer_tx.clone();
                    tokio::spawn(async move {
                        let response = relay_request(&http, &origin_base, request).await;
                        let _ = send_response(&writer_tx, response);
                    });
                }
                Err(e) => {
                    warn!(error = %e, "malformed tunnel request frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "read error on tunnel channel");
                break;
            }
        }
    }

    writer_task.abort();
}

fn send_response(writer_tx: &mpsc::UnboundedSender<Message>, response: TunnelResponse) -> Result<(), ()> {
    let text = serde_json::to_string(&response).map_err(|_| ())?;
    writer_tx.send(Message::Text(text.into())).map_err(|_| ())
}

/// Performs the local HTTP call described by `request` and frames the
/// result as a `TunnelResponse` carrying the same correlation ID.
async fn relay_request(http: &Client, origin_base: &str, request: TunnelRequest) -> TunnelResponse {
    let url = format!("{}{}", origin_base, request.path);
    let method = match request.method.parse::<reqwest::Method>() {
        Ok(m) => m,
        Err(_) => return TunnelResponse::bad_gateway(request.id, "unsupported method"),
    };

    let mut builder = http.request(method, &url).body(request.body);
    for (name, value) in &request.headers {
        for part in tunnel_protocol::split_header_value(name, value) {
            builder = builder.header(name, part);
        }
    }

    match builder.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let mut headers = tunnel_protocol::Headers::new();
            for name in resp.headers().keys() {
                let values: Vec<&str> = resp
                    .headers()
                    .get_all(name)
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .collect();
                headers.insert(
                    name.as_str().to_string(),
                    tunnel_protocol::join_header_values(name.as_str(), values.into_iter()),
                );
            }
            let body = resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            TunnelResponse {
                id: request.id,
                status,
                headers,
                body,
            }
        }
        Err(e) => {
            warn!(error = %e, url = %url, "origin request failed");
            TunnelResponse::bad_gateway(request.id, &e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relay_request_returns_bad_gateway_for_invalid_method() {
        let http = Client::new();
        let request = TunnelRequest {
            id: "1".to_string(),
            method: "NOTAMETHOD ".to_string(),
            path: "/".to_string(),
            headers: tunnel_protocol::Headers::new(),
            body: Vec::new(),
        };
        let response = relay_request(&http, "http://127.0.0.1:1", request).await;
        assert_eq!(response.status, 502);
    }

    #[tokio::test]
    async fn relay_request_returns_bad_gateway_when_origin_unreachable() {
        let http = Client::new();
        let request = TunnelRequest {
            id: "2".to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            headers: tunnel_protocol::Headers::new(),
            body: Vec::new(),
        };
        // Port 1 should not have a listener in the test environment.
        let response = relay_request(&http, "http://127.0.0.1:1", request).await;
        assert_eq!(response.status, 502);
        assert_eq!(response.id, "2");
    }
}
