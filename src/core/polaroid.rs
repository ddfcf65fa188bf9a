//! Polaroid photo-booth waiting room
//!
//! Tracks which phones are in the photo-capture flow. The interesting part is
//! the edge transitions: the first entry broadcasts `photo_booth_requested` to
//! tablets, and draining the queue broadcasts `polaroid_queue_empty`. Entries
//! self-expire after a configured timeout; expiry goes through the same
//! removal path as an explicit leave, so the two are indistinguishable to
//! observers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::registry::{ClientRole, ConnectionRegistry};
use crate::handlers::ws::messages::OutgoingMessage;

pub struct PolaroidQueue {
    registry: Arc<ConnectionRegistry>,
    ttl: Duration,
    entries: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PolaroidQueue {
    pub fn new(registry: Arc<ConnectionRegistry>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            ttl,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Add a connection to the queue. Membership is idempotent: a second
    /// enter for the same id is a no-op and produces no broadcast.
    pub async fn enter(self: &Arc<Self>, connection_id: &str) {
        let was_empty;
        {
            let mut entries = self.entries.lock();
            if entries.contains_key(connection_id) {
                debug!("Connection {} already in polaroid queue", connection_id);
                return;
            }
            was_empty = entries.is_empty();

            let queue = Arc::clone(self);
            let id = connection_id.to_string();
            let ttl = self.ttl;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                info!("Polaroid entry for {} expired", id);
                queue.remove_entry(&id, false).await;
            });
            entries.insert(connection_id.to_string(), timer);
        }

        info!("Connection {} entered polaroid queue", connection_id);
        if was_empty {
            self.registry
                .broadcast_to_role(ClientRole::Tablet, &OutgoingMessage::PhotoBoothRequested)
                .await;
        }
    }

    /// Remove a connection from the queue. Leaving while not a member is a
    /// harmless no-op.
    pub async fn leave(&self, connection_id: &str) {
        self.remove_entry(connection_id, true).await;
    }

    /// Shared removal path for explicit leave and timer expiry. The expiry
    /// timer must not abort its own task, hence `cancel_timer`.
    async fn remove_entry(&self, connection_id: &str, cancel_timer: bool) {
        let now_empty;
        {
            let mut entries = self.entries.lock();
            let Some(timer) = entries.remove(connection_id) else {
                return;
            };
            if cancel_timer {
                timer.abort();
            }
            now_empty = entries.is_empty();
        }

        info!("Connection {} left polaroid queue", connection_id);
        if now_empty {
            self.registry
                .broadcast_to_role(ClientRole::Tablet, &OutgoingMessage::PolaroidQueueEmpty)
                .await;
        }
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.entries.lock().contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
