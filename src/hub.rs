//! Fan-out hub for live telemetry clients.
//!
//! The hub owns the registry of currently connected clients and republishes
//! every inbound telemetry payload to all of them. Payloads are opaque,
//! already-serialized strings; the hub never looks inside.
//!
//! A client whose transport has gone away is pruned on the first failed
//! delivery. Pruning happens inside the same `broadcast` call but never
//! interrupts delivery to the remaining clients, and the producer gets no
//! per-client feedback.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::debug;

/// Opaque identity of a connected telemetry client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClientId(u64);

/// One registered recipient. The hub only holds the outbound channel; the
/// underlying socket belongs to the network layer that drains it.
struct TelemetryClient {
    id: ClientId,
    tx: mpsc::UnboundedSender<String>,
}

/// Registry of connected live clients with failure-isolated fan-out.
pub struct BroadcastHub {
    /// Insertion-ordered; identity matters, order of delivery follows it.
    clients: RwLock<Vec<TelemetryClient>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a client's outbound channel. Call once per connection,
    /// after the transport handshake has completed.
    pub async fn connect(&self, tx: mpsc::UnboundedSender<String>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.clients.write().await.push(TelemetryClient { id, tx });
        debug!(client = id.0, "telemetry client connected");
        id
    }

    /// Remove a client if present; unknown ids are a no-op.
    pub async fn disconnect(&self, id: ClientId) {
        let mut clients = self.clients.write().await;
        if let Some(pos) = clients.iter().position(|c| c.id == id) {
            clients.remove(pos);
            debug!(client = id.0, "telemetry client disconnected");
        }
    }

    /// Deliver `message` to every registered client in registry order.
    ///
    /// Failed recipients are collected during the pass and dropped after
    /// it, so the registry is never mutated mid-iteration and one dead
    /// client cannot block delivery to the rest.
    pub async fn broadcast(&self, message: &str) {
        let mut clients = self.clients.write().await;

        let mut dead = Vec::new();
        for client in clients.iter() {
            if client.tx.send(message.to_owned()).is_err() {
                dead.push(client.id);
            }
        }

        for id in dead {
            if let Some(pos) = clients.iter().position(|c| c.id == id) {
                clients.remove(pos);
            }
            debug!(client = id.0, "pruned unreachable telemetry client");
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
