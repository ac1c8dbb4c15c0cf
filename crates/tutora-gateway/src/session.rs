//! Session lifecycle management.
//!
//! One logical tutoring session per user at a time. Starting a new session
//! while one is active supersedes it with an implicit abandon: the old
//! session is marked ended (abandoned) so it can never linger active yet
//! unreachable.

use dashmap::DashMap;
use tracing::{debug, info, warn};

use tutora_core::error::{CoreError, Result};
use tutora_core::types::{Session, SessionSummary};

/// Owns all sessions; referenced by the router via ids only
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    /// user_id -> currently active session_id
    active_by_user: DashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new active session for a user.
    ///
    /// Any prior active session for the same user is implicitly abandoned.
    pub fn start(&self, user_id: &str) -> String {
        if let Some((_, old_id)) = self.active_by_user.remove(user_id) {
            if let Some(mut old) = self.sessions.get_mut(&old_id) {
                old.abandon();
                warn!(user_id, session_id = %old_id, "abandoned prior active session");
            }
        }

        let session = Session::new(user_id);
        let session_id = session.session_id.clone();
        self.sessions.insert(session_id.clone(), session);
        self.active_by_user
            .insert(user_id.to_string(), session_id.clone());
        info!(user_id, %session_id, "session started");
        session_id
    }

    /// Session to attach a new connection to: the user's active session if
    /// one exists (sessions span connections), otherwise a fresh one
    pub fn open_for(&self, user_id: &str) -> String {
        if let Some(active) = self.active_for(user_id) {
            debug!(user_id, session_id = %active, "reusing active session");
            return active;
        }
        self.start(user_id)
    }

    /// End a session. Idempotent: ending an ended session returns the
    /// existing summary. Fails with `NotFound` for unknown ids.
    pub fn end(&self, session_id: &str, satisfaction: Option<f32>) -> Result<SessionSummary> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::not_found("session", session_id))?;

        if session.is_active() {
            session.end(satisfaction);
            self.active_by_user
                .remove_if(&session.user_id, |_, active| active == session_id);
            info!(%session_id, turns = session.turn_count, "session ended");
        }
        Ok(session.summary())
    }

    /// Count one interaction turn and touch activity time
    pub fn record_turn(&self, session_id: &str) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::not_found("session", session_id))?;
        if session.is_active() {
            session.turn_count += 1;
            session.touch();
        }
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Active session id for a user, if any
    pub fn active_for(&self, user_id: &str) -> Option<String> {
        self.active_by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
