use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router
///
/// The `/ws` endpoint is intentionally unauthenticated: clients are kiosk
/// hardware on a closed exhibit network, identity is self-declared via the
/// `identify` message, and the gateway stores nothing durable. Protect the
/// endpoint at the network layer if it is ever exposed more widely.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws::ws_gateway_handler))
        .layer(TraceLayer::new_for_http())
}
