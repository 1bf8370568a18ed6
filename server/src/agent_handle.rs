//! # Agent Handle
//!
//! Per-agent state: the outbound writer queue for one agent's channel,
//! and the pending table correlating in-flight request IDs to
//! rendezvous slots. Exactly one `AgentHandle` exists at a time per
//! subdomain (enforced by the [`Registry`](crate::registry::Registry),
//! not here).
//!
//! Write serialization follows the teacher's outbound-task idiom: a
//! single dedicated task drains an unbounded `mpsc` queue and performs
//! every frame write, so concurrent `enqueue_request` callers never
//! interleave bytes on the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tunnel_protocol::TunnelRequest;

use crate::error::DispatchError;

/// A single-shot, capacity-1 delivery point for one [`TunnelResponse`].
///
/// Implemented as a `tokio::sync::oneshot` channel: a second or late
/// delivery attempt after the receiver has already been consumed (or
/// dropped on timeout) is simply a no-op send that returns `Err` and is
/// discarded — exactly the silent-drop behavior the dispatch protocol
/// requires, with no extra bookkeeping.
pub type RendezvousSlot = oneshot::Receiver<tunnel_protocol::TunnelResponse>;

pub struct AgentHandle {
    subdomain: String,
    writer_tx: mpsc::UnboundedSender<Message>,
    pending: DashMap<String, oneshot::Sender<tunnel_protocol::TunnelResponse>>,
    alive: AtomicBool,
}

impl AgentHandle {
    pub fn new(subdomain: String, writer_tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            subdomain,
            writer_tx,
            pending: DashMap::new(),
            alive: AtomicBool::new(true),
        }
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Installs a rendezvous slot for `request.id`, then serializes a
    /// write of the framed message onto the channel. On any failure —
    /// dead channel, closed writer queue, serialization error — the
    /// freshly installed pending-table entry is removed before
    /// returning, so no slot is ever leaked.
    pub fn enqueue_request(&self, request: TunnelRequest) -> Result<RendezvousSlot, DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request.id.clone(), tx);

        let text = match serde_json::to_string(&request) {
            Ok(t) => t,
            Err(e) => {
                self.pending.remove(&request.id);
                return Err(DispatchError::ChannelWrite(e.to_string()));
            }
        };

        if self.writer_tx.send(Message::Text(text.into())).is_err() {
            self.pending.remove(&request.id);
            return Err(DispatchError::ChannelWrite(
                "agent channel is closed".to_string(),
            ));
        }

        Ok(rx)
    }

    /// Called by the owning session's read loop only. Looks up the slot
    /// by `response.id` and attempts delivery; a missing entry (the
    /// dispatcher already timed out) or a slot whose receiver was
    /// already dropped are both silently ignored.
    pub fn deliver_response(&self, response: tunnel_protocol::TunnelResponse) {
        if let Some((_, tx)) = self.pending.remove(&response.id) {
            let _ = tx.send(response);
        }
    }

    /// Removes a pending entry without delivering anything. Used by the
    /// dispatcher after its own deadline fires, so a response that
    /// arrives afterward finds nothing to deliver to.
    pub fn abandon(&self, id: &str) {
        self.pending.remove(id);
    }

    /// Marks the handle dead. Wakes no waiters directly — they rely on
    /// their own per-request deadline, per the dispatch protocol.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }
}
