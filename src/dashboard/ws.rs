//! WebSocket endpoint for real-time telemetry streaming.
//!
//! Each connection is registered in the [`BroadcastHub`] once the upgrade
//! handshake completes. Everything written to the client funnels through
//! one per-client channel, so broadcasts and echo replies keep their order.
//! The connection is deregistered on close, error, or a dead writer.
//!
//! Inbound text gets a synchronous `Echo:` reply on the same connection.
//! The echo is a liveness aid only; it is not part of telemetry delivery
//! and must not be read as an acknowledgment.
//!
//! [`BroadcastHub`]: crate::hub::BroadcastHub

use crate::dashboard::state::DashboardState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// WebSocket upgrade handler for `/ws`
pub async fn ws_endpoint(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DashboardState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<DashboardState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let client_id = state.hub.connect(tx.clone()).await;

    // Writer side: drains the per-client channel into the socket.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if tx.send(echo_reply(text.as_str())).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client = ?client_id, error = %e, "websocket receive error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.hub.disconnect(client_id).await;
    writer.abort();
    debug!(client = ?client_id, "websocket connection closed");
}

/// Diagnostic reply for an inbound client message. Sent on the client's own
/// channel only, never through the hub.
fn echo_reply(text: &str) -> String {
    format!("Echo: {text}")
}
