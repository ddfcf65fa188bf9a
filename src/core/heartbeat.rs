//! Connection heartbeat subsystem
//!
//! Two independent liveness mechanisms:
//!
//! (a) a transport-level prober that pings every registered connection on a
//! fixed interval — purely observational, with no timeout check of its own;
//!
//! (b) application-level liveness for `esp32_sensor` connections, which
//! cannot be trusted to answer transport pings reliably. A pinger sends
//! `{type: "ping"}` JSON frames, and an independent reviewer counts misses
//! (ping outstanding and the last pong older than a grace window) before
//! evicting after a configured number of consecutive misses. Any observed
//! pong, or a client-originated ping, resets the count.
//!
//! Each job is an `*_once` function plus a `spawn_*` interval loop so tests
//! can drive single ticks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::registry::{ClientRole, ConnectionRegistry};
use crate::handlers::ws::messages::{MessageRoute, OutgoingMessage};
use crate::state::AppState;

/// One transport-prober tick: ping every connection, stamp the send time.
/// A failed send means the socket is already gone; treat it as a close.
pub async fn probe_once(registry: &ConnectionRegistry) {
    for (id, sender) in registry.prober_targets().await {
        if sender.send(MessageRoute::Ping).await.is_err() {
            warn!("Transport ping to {} failed; closing", id);
            registry.force_close(&id).await;
        } else {
            registry.stamp_ping(&id).await;
        }
    }
}

/// One sensor-pinger tick: application-level ping to every sensor
pub async fn sensor_ping_once(registry: &ConnectionRegistry) {
    for id in registry.ids_with_role(ClientRole::Esp32Sensor).await {
        if registry.send_to(&id, OutgoingMessage::Ping).await {
            registry.stamp_ping(&id).await;
            debug!("Sent application ping to sensor {}", id);
        }
    }
}

/// One reviewer tick: count misses and evict sensors past the threshold.
/// Returns the ids of evicted connections.
pub async fn sensor_review_once(
    registry: &ConnectionRegistry,
    pong_grace: Duration,
    max_missed: u32,
) -> Vec<String> {
    let mut evicted = Vec::new();
    for snapshot in registry.liveness_of_role(ClientRole::Esp32Sensor).await {
        let ping_outstanding = snapshot.last_ping_at > snapshot.last_pong_at;
        if ping_outstanding && snapshot.last_pong_at.elapsed() > pong_grace {
            let missed = registry.record_miss(&snapshot.id).await;
            warn!(
                "Sensor {} missed ping {} of {}",
                snapshot.id, missed, max_missed
            );
            if missed >= max_missed {
                warn!("Evicting unresponsive sensor {}", snapshot.id);
                registry.force_close(&snapshot.id).await;
                evicted.push(snapshot.id);
            }
        }
    }
    evicted
}

/// Start the three heartbeat loops for the process lifetime
pub fn spawn_heartbeat(state: Arc<AppState>) {
    let prober_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(prober_state.config.ping_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            probe_once(&prober_state.registry).await;
        }
    });

    let pinger_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(pinger_state.config.sensor_ping_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            sensor_ping_once(&pinger_state.registry).await;
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sensor_review_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            sensor_review_once(
                &state.registry,
                state.config.sensor_pong_grace,
                state.config.sensor_max_missed_pings,
            )
            .await;
        }
    });
}
