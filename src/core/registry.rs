//! Connection registry
//!
//! Owns the mapping from a connection id to the live writer channel, the
//! declared role, and passive liveness metadata. Every other subsystem
//! reaches peer connections through this registry and indexes by id, never by
//! the socket handle, so a reconnect is indistinguishable from a new
//! connection. Ids are UUIDs and are never reused for the process lifetime.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::handlers::ws::messages::{MessageRoute, OutgoingMessage};

/// Declared role of a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    Phone,
    Tablet,
    Esp32Sensor,
    Unidentified,
}

impl ClientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientRole::Phone => "phone",
            ClientRole::Tablet => "tablet",
            ClientRole::Esp32Sensor => "esp32_sensor",
            ClientRole::Unidentified => "unidentified",
        }
    }
}

/// One registered connection
pub struct ConnectionEntry {
    pub id: String,
    pub role: ClientRole,
    pub sender: mpsc::Sender<MessageRoute>,
    pub cancel: CancellationToken,
    pub last_ping_at: Instant,
    pub last_pong_at: Instant,
    pub missed_pings: u32,
    pub healthy: bool,
}

/// Liveness snapshot used by the sensor heartbeat reviewer
#[derive(Debug, Clone)]
pub struct LivenessSnapshot {
    pub id: String,
    pub last_ping_at: Instant,
    pub last_pong_at: Instant,
    pub missed_pings: u32,
}

/// Registry of live connections, shared across handlers and sweep tasks
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection and return its generated id
    pub async fn register(
        &self,
        sender: mpsc::Sender<MessageRoute>,
        cancel: CancellationToken,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();
        let entry = ConnectionEntry {
            id: id.clone(),
            role: ClientRole::Unidentified,
            sender,
            cancel,
            last_ping_at: now,
            last_pong_at: now,
            missed_pings: 0,
            healthy: true,
        };
        self.connections.write().await.insert(id.clone(), entry);
        debug!("Registered connection {}", id);
        id
    }

    /// Record the declared role. Idempotent; last write wins.
    pub async fn set_role(&self, id: &str, role: ClientRole) -> bool {
        match self.connections.write().await.get_mut(id) {
            Some(entry) => {
                entry.role = role;
                true
            }
            None => false,
        }
    }

    pub async fn role_of(&self, id: &str) -> Option<ClientRole> {
        self.connections.read().await.get(id).map(|e| e.role)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Remove a connection. Safe to call more than once; only the first call
    /// returns the entry.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.connections.write().await.remove(id).is_some();
        if removed {
            debug!("Removed connection {}", id);
        }
        removed
    }

    /// Cancel a connection's socket tasks. The normal close path then runs
    /// the full teardown cascade.
    pub async fn force_close(&self, id: &str) {
        if let Some(entry) = self.connections.read().await.get(id) {
            warn!("Force-closing connection {}", id);
            entry.cancel.cancel();
        }
    }

    /// Deliver a message to a single connection. Returns false if the
    /// connection is unknown or its writer has gone away.
    pub async fn send_to(&self, id: &str, message: OutgoingMessage) -> bool {
        let sender = match self.connections.read().await.get(id) {
            Some(entry) => entry.sender.clone(),
            None => return false,
        };
        if sender.send(MessageRoute::Outgoing(message)).await.is_err() {
            self.force_close(id).await;
            return false;
        }
        true
    }

    pub async fn ids_with_role(&self, role: ClientRole) -> Vec<String> {
        self.connections
            .read()
            .await
            .values()
            .filter(|e| e.role == role)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Deliver a message to every connection holding `role`.
    ///
    /// The message is serialized once; a failed send closes that connection
    /// but never aborts delivery to the rest. Returns the delivered count.
    pub async fn broadcast_to_role(&self, role: ClientRole, message: &OutgoingMessage) -> usize {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize broadcast message: {}", e);
                return 0;
            }
        };

        let targets: Vec<(String, mpsc::Sender<MessageRoute>)> = self
            .connections
            .read()
            .await
            .values()
            .filter(|e| e.role == role)
            .map(|e| (e.id.clone(), e.sender.clone()))
            .collect();

        let mut delivered = 0;
        for (id, sender) in targets {
            if sender
                .send(MessageRoute::Serialized(json.clone()))
                .await
                .is_ok()
            {
                delivered += 1;
            } else {
                warn!("Broadcast to {} failed; closing connection", id);
                self.force_close(&id).await;
            }
        }
        debug!(
            "Broadcast to role {} delivered to {} connection(s)",
            role.as_str(),
            delivered
        );
        delivered
    }

    /// Snapshot every connection's writer for the transport-level prober
    pub async fn prober_targets(&self) -> Vec<(String, mpsc::Sender<MessageRoute>)> {
        self.connections
            .read()
            .await
            .values()
            .map(|e| (e.id.clone(), e.sender.clone()))
            .collect()
    }

    /// Stamp the time a ping was sent to this connection
    pub async fn stamp_ping(&self, id: &str) {
        if let Some(entry) = self.connections.write().await.get_mut(id) {
            entry.last_ping_at = Instant::now();
        }
    }

    /// A pong (or client-originated ping) was observed: reset miss counting
    /// and mark the connection healthy.
    pub async fn mark_alive(&self, id: &str) {
        if let Some(entry) = self.connections.write().await.get_mut(id) {
            entry.last_pong_at = Instant::now();
            entry.missed_pings = 0;
            entry.healthy = true;
        }
    }

    /// Liveness snapshots for every connection holding `role`
    pub async fn liveness_of_role(&self, role: ClientRole) -> Vec<LivenessSnapshot> {
        self.connections
            .read()
            .await
            .values()
            .filter(|e| e.role == role)
            .map(|e| LivenessSnapshot {
                id: e.id.clone(),
                last_ping_at: e.last_ping_at,
                last_pong_at: e.last_pong_at,
                missed_pings: e.missed_pings,
            })
            .collect()
    }

    /// Count a missed ping and mark the connection unhealthy. Returns the new
    /// miss count (zero if the connection disappeared meanwhile).
    pub async fn record_miss(&self, id: &str) -> u32 {
        match self.connections.write().await.get_mut(id) {
            Some(entry) => {
                entry.missed_pings += 1;
                entry.healthy = false;
                entry.missed_pings
            }
            None => 0,
        }
    }

    pub async fn is_healthy(&self, id: &str) -> Option<bool> {
        self.connections.read().await.get(id).map(|e| e.healthy)
    }
}
