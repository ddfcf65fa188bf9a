//! Image-edit handoff protocol
//!
//! Coordinates a phone (submitter) and a tablet (editor) through
//! propose → accept → iterate → finalize/cancel on top of the session store.
//! Role gating happens here: only phones start sessions and only tablets
//! accept, edit, and finalize. The assigned-tablet equality checks are strict;
//! an unassigned tablet never mutates a session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::registry::ClientRole;
use crate::state::AppState;

use super::messages::{MessageRoute, OutgoingMessage};

async fn send(tx: &mpsc::Sender<MessageRoute>, message: OutgoingMessage) {
    let _ = tx.send(MessageRoute::Outgoing(message)).await;
}

async fn send_edit_error(
    tx: &mpsc::Sender<MessageRoute>,
    session_id: Option<&str>,
    message: &str,
    code: &str,
) {
    send(
        tx,
        OutgoingMessage::AiEditError {
            session_id: session_id.map(|s| s.to_string()),
            message: message.to_string(),
            code: Some(code.to_string()),
        },
    )
    .await;
}

/// Verify the caller holds `role`, reporting an unauthorized-role error
/// otherwise. Role gating lives here, not in the session store.
async fn require_role(
    state: &Arc<AppState>,
    client_id: &str,
    role: ClientRole,
    session_id: Option<&str>,
    tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    if state.registry.role_of(client_id).await == Some(role) {
        return true;
    }
    warn!(
        "Connection {} attempted a {}-only edit action",
        client_id,
        role.as_str()
    );
    send_edit_error(
        tx,
        session_id,
        &format!("only {} clients may perform this action", role.as_str()),
        "unauthorized_role",
    )
    .await;
    false
}

/// Phone opens a session; tablets are invited by broadcast
pub async fn handle_start(
    state: &Arc<AppState>,
    client_id: &str,
    image: String,
    tx: &mpsc::Sender<MessageRoute>,
) {
    if !require_role(state, client_id, ClientRole::Phone, None, tx).await {
        return;
    }
    if image.trim().is_empty() {
        send_edit_error(tx, None, "an image is required to start editing", "validation").await;
        return;
    }

    let session = state.edit_sessions.create(client_id, image);
    let invited = state
        .registry
        .broadcast_to_role(
            ClientRole::Tablet,
            &OutgoingMessage::AiEditRequest {
                session_id: session.session_id.clone(),
                image: session.original_image.clone(),
            },
        )
        .await;
    info!(
        "Edit session {} announced to {} tablet(s)",
        session.session_id, invited
    );
    send(
        tx,
        OutgoingMessage::AiEditStarted {
            session_id: session.session_id,
        },
    )
    .await;
}

/// Tablet claims a session. A prior claim is overwritten: last claimer wins.
pub async fn handle_accept(
    state: &Arc<AppState>,
    client_id: &str,
    session_id: &str,
    tx: &mpsc::Sender<MessageRoute>,
) {
    if !require_role(state, client_id, ClientRole::Tablet, Some(session_id), tx).await {
        return;
    }
    match state.edit_sessions.assign_tablet(session_id, client_id) {
        Some(session) => {
            info!("Tablet {} accepted session {}", client_id, session_id);
            send(
                tx,
                OutgoingMessage::AiEditAccepted {
                    session_id: session.session_id,
                },
            )
            .await;
        }
        None => {
            send_edit_error(
                tx,
                Some(session_id),
                "session not found or expired",
                "not_found",
            )
            .await;
        }
    }
}

/// Tablet requests one edit iteration on the session's current image.
/// Provider failure leaves the session untouched and retryable.
pub async fn handle_prompt(
    state: Arc<AppState>,
    client_id: String,
    session_id: String,
    prompt: String,
    negative_prompt: Option<String>,
    tx: mpsc::Sender<MessageRoute>,
) {
    if !require_role(&state, &client_id, ClientRole::Tablet, Some(&session_id), &tx).await {
        return;
    }
    let Some(session) = state.edit_sessions.get_live(&session_id) else {
        send_edit_error(
            &tx,
            Some(&session_id),
            "session not found or expired",
            "not_found",
        )
        .await;
        return;
    };
    if session.tablet_id.as_deref() != Some(client_id.as_str()) {
        send_edit_error(
            &tx,
            Some(&session_id),
            "not assigned to this session",
            "not_assigned",
        )
        .await;
        return;
    }
    let Some(editor) = state.providers.image.clone() else {
        send_edit_error(
            &tx,
            Some(&session_id),
            "image editing is not configured",
            "config",
        )
        .await;
        return;
    };

    send(
        &tx,
        OutgoingMessage::AiEditProcessing {
            session_id: session_id.clone(),
        },
    )
    .await;

    let budget = state.config.image_edit_timeout;
    let edited = tokio::time::timeout(
        budget,
        editor.edit(&session.current_image, &prompt, negative_prompt.as_deref()),
    )
    .await;

    match edited {
        Ok(Ok(image)) => {
            if state
                .edit_sessions
                .apply_edit(&session_id, &client_id, image.clone())
            {
                send(
                    &tx,
                    OutgoingMessage::AiEditResult {
                        session_id,
                        image,
                    },
                )
                .await;
            } else {
                // Session vanished or was claimed by another tablet mid-edit
                send_edit_error(
                    &tx,
                    Some(&session_id),
                    "not assigned to this session",
                    "not_assigned",
                )
                .await;
            }
        }
        Ok(Err(e)) => {
            warn!("Image edit for {} failed: {}", session_id, e);
            send_edit_error(&tx, Some(&session_id), &e.to_string(), "provider_error").await;
        }
        Err(_) => {
            warn!("Image edit for {} timed out after {:?}", session_id, budget);
            send_edit_error(
                &tx,
                Some(&session_id),
                &format!("image edit timed out after {}s", budget.as_secs()),
                "timeout",
            )
            .await;
        }
    }
}

/// Tablet delivers the finished image back to the originating phone and the
/// session is consumed.
pub async fn handle_finalize(
    state: &Arc<AppState>,
    client_id: &str,
    session_id: &str,
    final_image: Option<String>,
    tx: &mpsc::Sender<MessageRoute>,
) {
    if !require_role(state, client_id, ClientRole::Tablet, Some(session_id), tx).await {
        return;
    }
    let Some(session) = state.edit_sessions.get_live(session_id) else {
        send_edit_error(
            tx,
            Some(session_id),
            "session not found or expired",
            "not_found",
        )
        .await;
        return;
    };
    if session.tablet_id.as_deref() != Some(client_id) {
        send_edit_error(
            tx,
            Some(session_id),
            "not assigned to this session",
            "not_assigned",
        )
        .await;
        return;
    }

    // The session is consumed before phone delivery is attempted; a phone
    // that disconnected meanwhile surfaces as an error to the tablet.
    state.edit_sessions.remove(session_id);
    let edited_image = final_image.unwrap_or(session.current_image);
    let delivered = state
        .registry
        .send_to(
            &session.phone_id,
            OutgoingMessage::AiEditComplete {
                session_id: session_id.to_string(),
                edited_image,
            },
        )
        .await;

    if delivered {
        info!(
            "Session {} finalized back to phone {}",
            session_id, session.phone_id
        );
        send(
            tx,
            OutgoingMessage::AiEditFinalized {
                session_id: session_id.to_string(),
            },
        )
        .await;
    } else {
        send_edit_error(
            tx,
            Some(session_id),
            "originating phone is no longer connected",
            "not_found",
        )
        .await;
    }
}

/// Either assigned party tears the session down; the other party is told
/// if still connected.
pub async fn handle_cancel(
    state: &Arc<AppState>,
    client_id: &str,
    session_id: &str,
    tx: &mpsc::Sender<MessageRoute>,
) {
    let Some(session) = state.edit_sessions.get_live(session_id) else {
        send_edit_error(
            tx,
            Some(session_id),
            "session not found or expired",
            "not_found",
        )
        .await;
        return;
    };

    let is_phone = session.phone_id == client_id;
    let is_tablet = session.tablet_id.as_deref() == Some(client_id);
    if !is_phone && !is_tablet {
        send_edit_error(
            tx,
            Some(session_id),
            "not a participant in this session",
            "not_assigned",
        )
        .await;
        return;
    }

    state.edit_sessions.remove(session_id);
    let by = if is_phone { "phone" } else { "tablet" };
    info!("Session {} cancelled by {}", session_id, by);

    let other_party = if is_phone {
        session.tablet_id.clone()
    } else {
        Some(session.phone_id.clone())
    };
    if let Some(other) = other_party {
        state
            .registry
            .send_to(
                &other,
                OutgoingMessage::AiEditCancelled {
                    session_id: session_id.to_string(),
                    by: by.to_string(),
                },
            )
            .await;
    }
}
