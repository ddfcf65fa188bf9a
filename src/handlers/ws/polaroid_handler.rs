//! Photo-booth queue message handlers
//!
//! Thin wrappers over the polaroid queue; the queue itself owns the
//! edge-transition broadcasts. Entry is not role-gated: the flow is driven by
//! phones, but nothing breaks if another role wanders in.

use std::sync::Arc;

use crate::state::AppState;

pub async fn handle_enter(state: &Arc<AppState>, client_id: &str) {
    state.polaroid.enter(client_id).await;
}

pub async fn handle_leave(state: &Arc<AppState>, client_id: &str) {
    state.polaroid.leave(client_id).await;
}
