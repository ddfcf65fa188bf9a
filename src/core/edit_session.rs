//! Image-edit session store
//!
//! A session coordinates exactly one phone (submitter) and at most one tablet
//! (editor) through propose → accept → iterate → finalize/cancel. The store
//! holds the session data and enforces the data-level invariants; role
//! gating and provider calls live in the message handler.
//!
//! Sessions are usable only while touched within the idle window. Any read
//! that finds an expired session deletes it and reports not-found; a periodic
//! sweep removes the rest silently.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EditSession {
    pub session_id: String,
    pub phone_id: String,
    pub tablet_id: Option<String>,
    pub original_image: String,
    pub current_image: String,
    pub created_at: Instant,
    pub last_activity_at: Instant,
}

pub struct EditSessionManager {
    sessions: Mutex<HashMap<String, EditSession>>,
    idle_ttl: Duration,
}

fn new_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("edit_{}_{}", millis, &salt[..8])
}

impl EditSessionManager {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Open a session owned by `phone_id` with the submitted image as both
    /// the original snapshot and the current working image.
    pub fn create(&self, phone_id: &str, image: String) -> EditSession {
        let now = Instant::now();
        let session = EditSession {
            session_id: new_session_id(),
            phone_id: phone_id.to_string(),
            tablet_id: None,
            original_image: image.clone(),
            current_image: image,
            created_at: now,
            last_activity_at: now,
        };
        info!(
            "Created edit session {} for phone {}",
            session.session_id, phone_id
        );
        self.sessions
            .lock()
            .insert(session.session_id.clone(), session.clone());
        session
    }

    fn is_expired(&self, session: &EditSession) -> bool {
        session.last_activity_at.elapsed() >= self.idle_ttl
    }

    /// Fetch a usable session, deleting it if the idle window has lapsed.
    pub fn get_live(&self, session_id: &str) -> Option<EditSession> {
        let mut sessions = self.sessions.lock();
        let expired = match sessions.get(session_id) {
            Some(session) => self.is_expired(session),
            None => return None,
        };
        if expired {
            sessions.remove(session_id);
            debug!("Edit session {} expired on access", session_id);
            return None;
        }
        sessions.get(session_id).cloned()
    }

    /// Claim the session for `tablet_id` and refresh its activity stamp.
    ///
    /// A session that already has a tablet is reassigned without complaint:
    /// last claimer wins. Returns the updated session, or None when the
    /// session is missing or expired.
    pub fn assign_tablet(&self, session_id: &str, tablet_id: &str) -> Option<EditSession> {
        let mut sessions = self.sessions.lock();
        let expired = match sessions.get(session_id) {
            Some(session) => self.is_expired(session),
            None => return None,
        };
        if expired {
            sessions.remove(session_id);
            return None;
        }
        let session = sessions.get_mut(session_id)?;
        session.tablet_id = Some(tablet_id.to_string());
        session.last_activity_at = Instant::now();
        Some(session.clone())
    }

    /// Replace the current image after a successful edit iteration.
    ///
    /// The caller must still be the assigned tablet; a mismatch (including a
    /// reassignment that raced the provider call) leaves the session
    /// untouched and returns false.
    pub fn apply_edit(&self, session_id: &str, tablet_id: &str, image: String) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if session.tablet_id.as_deref() != Some(tablet_id) {
            return false;
        }
        session.current_image = image;
        session.last_activity_at = Instant::now();
        true
    }

    pub fn touch(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().get_mut(session_id) {
            session.last_activity_at = Instant::now();
        }
    }

    /// Remove a session, returning it for final delivery or notifications.
    pub fn remove(&self, session_id: &str) -> Option<EditSession> {
        self.sessions.lock().remove(session_id)
    }

    /// Silently drop every session idle past the window. No notifications.
    pub fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity_at.elapsed() < self.idle_ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Swept {} expired edit session(s)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
