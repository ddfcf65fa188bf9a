//! Axum WebSocket handler
//!
//! Owns the socket lifecycle: register with the connection registry, send the
//! `connected` handshake, run a writer task for outgoing routes, and dispatch
//! incoming frames until the client closes, an error occurs, or the
//! connection is force-closed (heartbeat eviction, failed broadcast). Every
//! exit runs the same teardown cascade so no subsystem keeps a dead id.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::{
    messages::{IncomingMessage, MessageRoute, OutgoingMessage},
    processor::handle_incoming_message,
};

/// Outgoing channel depth per connection; broadcast storms (tablet fan-out of
/// full images) need headroom before senders start blocking.
const CHANNEL_BUFFER_SIZE: usize = 256;

/// WebSocket gateway upgrade handler
pub async fn ws_gateway_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("WebSocket connection upgrade requested");
    let max_payload = state.config.max_ws_payload_bytes;
    ws.max_message_size(max_payload)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage one client connection from accept to teardown
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);
    let cancel = CancellationToken::new();

    let client_id = state
        .registry
        .register(message_tx.clone(), cancel.clone())
        .await;
    info!("WebSocket connection established as {}", client_id);

    // Writer task: the only owner of the sink half
    let writer = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json) => sink.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Serialized(json) => sink.send(Message::Text(json.into())).await,
                MessageRoute::Ping => sink.send(Message::Ping(bytes::Bytes::new())).await,
                MessageRoute::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    // Handshake: the client learns its id before anything else
    let _ = message_tx
        .send(MessageRoute::Outgoing(OutgoingMessage::Connected {
            client_id: client_id.clone(),
        }))
        .await;

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("Connection {} force-closed by the server", client_id);
                let _ = message_tx.send(MessageRoute::Close).await;
                break;
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(message)) => {
                        if !process_frame(message, &client_id, &message_tx, &state).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", client_id, e);
                        break;
                    }
                    None => {
                        info!("Connection {} closed by client", client_id);
                        break;
                    }
                }
            }
        }
    }

    writer.abort();
    teardown(&state, &client_id).await;
    info!("WebSocket connection {} terminated", client_id);
}

/// Dispatch one transport frame; returns false to end the connection
async fn process_frame(
    message: Message,
    client_id: &str,
    message_tx: &mpsc::Sender<MessageRoute>,
    state: &Arc<AppState>,
) -> bool {
    match message {
        Message::Text(text) => {
            debug!("Received text frame: {} byte(s)", text.len());
            let incoming: IncomingMessage = match serde_json::from_str(&text) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Unparseable message from {}: {}", client_id, e);
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::Error {
                            stage: "validation".to_string(),
                            message: format!("Invalid message format: {e}"),
                            code: Some("validation".to_string()),
                        }))
                        .await;
                    return true;
                }
            };
            handle_incoming_message(incoming, client_id, message_tx, state).await
        }
        Message::Binary(data) => {
            // The kiosk protocol is JSON text frames only
            debug!("Ignoring {} byte binary frame from {}", data.len(), client_id);
            true
        }
        Message::Ping(_) => {
            // Transport pong reply is handled by axum
            true
        }
        Message::Pong(_) => {
            state.registry.mark_alive(client_id).await;
            true
        }
        Message::Close(_) => {
            info!("Connection {} sent close frame", client_id);
            false
        }
    }
}

/// Teardown cascade: every subsystem that indexed this id lets go of it.
/// Safe to reach via close, error, and eviction simultaneously.
///
/// Edit sessions deliberately survive: a finalize for a disconnected phone
/// reports its own error, and idle sessions expire on their own.
pub async fn teardown(state: &Arc<AppState>, client_id: &str) {
    state.registry.remove(client_id).await;
    state.polaroid.leave(client_id).await;
    state.streams.drop_connection(client_id);
}
