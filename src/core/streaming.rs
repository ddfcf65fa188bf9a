//! Streaming envelope manager
//!
//! Wraps raw AI-completion chunks with `{sessionId, queryId, sequence, chunk,
//! final}` envelopes. Sequence numbers start at 0 and are gapless per stream;
//! every emitted chunk is retained so a client that detects a gap can ask for
//! a retransmission. Small chunks are coalesced: the buffer flushes once it
//! reaches a minimum size or once a maximum delay elapses, whichever comes
//! first, which amortizes many tiny socket writes against latency.
//!
//! Completed streams are retained (marked complete) until the idle sweep so
//! late retransmit requests for the tail still resolve; error paths drop the
//! stream immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::registry::ConnectionRegistry;
use crate::handlers::ws::messages::OutgoingMessage;

/// Coalescing buffer flushes once it holds at least this many bytes
pub const MIN_FLUSH_BYTES: usize = 48;
/// ... or once the oldest buffered chunk has waited this long
pub const MAX_FLUSH_DELAY: Duration = Duration::from_millis(120);

struct StoredChunk {
    text: String,
    is_final: bool,
}

struct StreamSession {
    connection_id: String,
    query_id: String,
    chunks: Vec<StoredChunk>,
    buffer: String,
    flush_task: Option<JoinHandle<()>>,
    completed: bool,
    last_activity_at: Instant,
}

fn session_key(connection_id: &str, query_id: &str) -> String {
    format!("{connection_id}:{query_id}")
}

fn envelope(
    connection_id: &str,
    query_id: &str,
    sequence: u64,
    chunk: String,
    is_final: bool,
) -> OutgoingMessage {
    OutgoingMessage::AiStream {
        session_id: connection_id.to_string(),
        query_id: query_id.to_string(),
        sequence,
        chunk,
        is_final,
    }
}

/// Registry of in-flight AI response streams
pub struct StreamRegistry {
    registry: Arc<ConnectionRegistry>,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, StreamSession>>,
}

impl StreamRegistry {
    pub fn new(registry: Arc<ConnectionRegistry>, idle_ttl: Duration) -> Self {
        Self {
            registry,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking one AI response stream for a connection/query pair.
    /// Reusing the same pair restarts the stream from sequence 0.
    pub fn open(&self, connection_id: &str, query_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(old) = sessions.insert(
            session_key(connection_id, query_id),
            StreamSession {
                connection_id: connection_id.to_string(),
                query_id: query_id.to_string(),
                chunks: Vec::new(),
                buffer: String::new(),
                flush_task: None,
                completed: false,
                last_activity_at: Instant::now(),
            },
        ) {
            if let Some(task) = old.flush_task {
                task.abort();
            }
        }
    }

    /// Take the buffer as the next stored chunk and build its envelope.
    /// Caller guarantees the buffer is non-empty. `from_timer` distinguishes
    /// the deadline task (which must not abort itself) from the push path.
    fn flush_buffer(sess: &mut StreamSession, from_timer: bool) -> OutgoingMessage {
        if from_timer {
            sess.flush_task = None;
        } else if let Some(task) = sess.flush_task.take() {
            task.abort();
        }
        let sequence = sess.chunks.len() as u64;
        let text = std::mem::take(&mut sess.buffer);
        sess.chunks.push(StoredChunk {
            text: text.clone(),
            is_final: false,
        });
        envelope(&sess.connection_id, &sess.query_id, sequence, text, false)
    }

    /// Buffer one raw chunk, flushing by size or scheduling a deadline flush.
    /// Empty chunks are suppressed.
    pub async fn push_chunk(self: &Arc<Self>, connection_id: &str, query_id: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut to_send = None;
        {
            let mut sessions = self.sessions.lock();
            let Some(sess) = sessions.get_mut(&session_key(connection_id, query_id)) else {
                return;
            };
            sess.buffer.push_str(text);
            sess.last_activity_at = Instant::now();
            if sess.buffer.len() >= MIN_FLUSH_BYTES {
                to_send = Some(Self::flush_buffer(sess, false));
            } else if sess.flush_task.is_none() {
                let streams = Arc::clone(self);
                let conn = connection_id.to_string();
                let query = query_id.to_string();
                sess.flush_task = Some(tokio::spawn(async move {
                    tokio::time::sleep(MAX_FLUSH_DELAY).await;
                    streams.flush_due(&conn, &query).await;
                }));
            }
        }
        if let Some(message) = to_send {
            self.registry.send_to(connection_id, message).await;
        }
    }

    /// Deadline flush fired by the task scheduled in `push_chunk`
    async fn flush_due(&self, connection_id: &str, query_id: &str) {
        let mut to_send = None;
        {
            let mut sessions = self.sessions.lock();
            if let Some(sess) = sessions.get_mut(&session_key(connection_id, query_id)) {
                if sess.buffer.is_empty() {
                    sess.flush_task = None;
                } else {
                    to_send = Some(Self::flush_buffer(sess, true));
                }
            }
        }
        if let Some(message) = to_send {
            self.registry.send_to(connection_id, message).await;
        }
    }

    /// Flush any remainder and emit the final marker. The stream stays
    /// retransmittable until the idle sweep collects it.
    pub async fn finish(&self, connection_id: &str, query_id: &str) {
        let mut to_send = Vec::new();
        {
            let mut sessions = self.sessions.lock();
            let Some(sess) = sessions.get_mut(&session_key(connection_id, query_id)) else {
                return;
            };
            if let Some(task) = sess.flush_task.take() {
                task.abort();
            }
            if !sess.buffer.is_empty() {
                to_send.push(Self::flush_buffer(sess, true));
            }
            let sequence = sess.chunks.len() as u64;
            sess.chunks.push(StoredChunk {
                text: String::new(),
                is_final: true,
            });
            sess.completed = true;
            sess.last_activity_at = Instant::now();
            to_send.push(envelope(
                connection_id,
                query_id,
                sequence,
                String::new(),
                true,
            ));
        }
        for message in to_send {
            self.registry.send_to(connection_id, message).await;
        }
    }

    /// Rebuild the envelope for a previously emitted sequence number
    pub fn retransmit(
        &self,
        connection_id: &str,
        query_id: &str,
        sequence: u64,
    ) -> Option<OutgoingMessage> {
        let sessions = self.sessions.lock();
        let sess = sessions.get(&session_key(connection_id, query_id))?;
        let stored = sess.chunks.get(sequence as usize)?;
        Some(envelope(
            connection_id,
            query_id,
            sequence,
            stored.text.clone(),
            stored.is_final,
        ))
    }

    /// Drop a stream immediately (error path)
    pub fn fail(&self, connection_id: &str, query_id: &str) {
        if let Some(sess) = self
            .sessions
            .lock()
            .remove(&session_key(connection_id, query_id))
        {
            if let Some(task) = sess.flush_task {
                task.abort();
            }
            debug!("Dropped failed stream {}:{}", connection_id, query_id);
        }
    }

    /// Drop every stream belonging to a closed connection
    pub fn drop_connection(&self, connection_id: &str) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, sess| {
            if sess.connection_id == connection_id {
                if let Some(task) = sess.flush_task.take() {
                    task.abort();
                }
                false
            } else {
                true
            }
        });
    }

    /// Remove streams idle past the window
    pub fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, sess| {
            if sess.last_activity_at.elapsed() >= self.idle_ttl {
                if let Some(task) = sess.flush_task.take() {
                    task.abort();
                }
                false
            } else {
                true
            }
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Swept {} idle stream(s)", removed);
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_completed(&self, connection_id: &str, query_id: &str) -> Option<bool> {
        self.sessions
            .lock()
            .get(&session_key(connection_id, query_id))
            .map(|s| s.completed)
    }
}
