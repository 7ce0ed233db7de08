//! WebSocket notification channel.

use crate::context::AppContext;
use crate::notifications::Hub;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

pub fn ws_routes() -> Router<AppContext> {
    Router::new().route("/ws", get(ws_handler))
}

/// HTTP handler that upgrades the connection to WebSocket.
async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx.hub))
}

/// Manage a single WebSocket connection after upgrade.
///
/// A writer task forwards hub messages to the socket; the read loop only
/// watches for the peer going away.
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let subscription = hub.subscribe();
    let sub_id = subscription.id;
    let mut rx = subscription.rx;
    tracing::info!(subscriber = %sub_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(message.as_ref()) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(subscriber = %sub_id, "Failed to encode notification: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                tracing::debug!(subscriber = %sub_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(subscriber = %sub_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    hub.unsubscribe(sub_id);
    send_task.abort();
    tracing::info!(subscriber = %sub_id, "WebSocket disconnected");
}
