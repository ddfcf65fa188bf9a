//! WebSocket message dispatch
//!
//! Routes parsed incoming messages to the owning subsystem. Query pipelines
//! and edit-prompt provider calls run in their own tasks so the connection's
//! read loop never blocks on upstream I/O — which also means two requests
//! from one client may interleave, by design.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::pipeline::{self, TextQueryRequest, VoiceQueryRequest};
use crate::state::AppState;

use super::{
    edit_handler,
    messages::{IncomingMessage, MessageRoute, OutgoingMessage},
    polaroid_handler,
};

/// Process one incoming message; returns false to end the connection
pub async fn handle_incoming_message(
    message: IncomingMessage,
    client_id: &str,
    message_tx: &mpsc::Sender<MessageRoute>,
    state: &Arc<AppState>,
) -> bool {
    match message {
        IncomingMessage::Identify { role } => {
            info!("Connection {} identified as {}", client_id, role.as_str());
            state.registry.set_role(client_id, role).await;
            true
        }
        IncomingMessage::PolaroidEntered => {
            polaroid_handler::handle_enter(state, client_id).await;
            true
        }
        IncomingMessage::PhotoCaptured => {
            polaroid_handler::handle_leave(state, client_id).await;
            true
        }
        IncomingMessage::VoiceQuery { id, format, data } => {
            let request = VoiceQueryRequest { id, format, data };
            tokio::spawn(pipeline::run_voice_query(
                state.clone(),
                client_id.to_string(),
                request,
                message_tx.clone(),
            ));
            true
        }
        IncomingMessage::TextQuery { id, text, tts } => {
            let request = TextQueryRequest { id, text, tts };
            tokio::spawn(pipeline::run_text_query(
                state.clone(),
                client_id.to_string(),
                request,
                message_tx.clone(),
            ));
            true
        }
        IncomingMessage::StartAiEdit { image } => {
            edit_handler::handle_start(state, client_id, image, message_tx).await;
            true
        }
        IncomingMessage::AiEditAccept { session_id } => {
            edit_handler::handle_accept(state, client_id, &session_id, message_tx).await;
            true
        }
        IncomingMessage::AiEditPrompt {
            session_id,
            prompt,
            negative_prompt,
        } => {
            tokio::spawn(edit_handler::handle_prompt(
                state.clone(),
                client_id.to_string(),
                session_id,
                prompt,
                negative_prompt,
                message_tx.clone(),
            ));
            true
        }
        IncomingMessage::AiEditFinalize {
            session_id,
            final_image,
        } => {
            edit_handler::handle_finalize(state, client_id, &session_id, final_image, message_tx)
                .await;
            true
        }
        IncomingMessage::AiEditCancel { session_id } => {
            edit_handler::handle_cancel(state, client_id, &session_id, message_tx).await;
            true
        }
        IncomingMessage::AiStreamRetransmit { query_id, sequence } => {
            match state.streams.retransmit(client_id, &query_id, sequence) {
                Some(chunk) => {
                    let _ = message_tx.send(MessageRoute::Outgoing(chunk)).await;
                }
                None => {
                    debug!(
                        "No stored chunk {} for stream {}:{}",
                        sequence, client_id, query_id
                    );
                }
            }
            true
        }
        IncomingMessage::Ping => {
            // Sensor devices probe the server too and expect an immediate pong
            state.registry.mark_alive(client_id).await;
            let _ = message_tx
                .send(MessageRoute::Outgoing(OutgoingMessage::Pong))
                .await;
            true
        }
        IncomingMessage::Pong => {
            state.registry.mark_alive(client_id).await;
            true
        }
    }
}
