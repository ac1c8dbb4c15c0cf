//! Live duplex connection tracking.
//!
//! At most one connection per user is authoritative: registering a new one
//! supersedes and closes the prior handle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

use tutora_core::error::CoreError;
use tutora_core::protocol::OutboundEvent;

/// Handle to one live connection, for sending events to its worker
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection id, unique per accepted socket
    pub id: String,
    /// Owning user
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<OutboundEvent>,
    last_activity: Arc<RwLock<DateTime<Utc>>>,
    shutdown: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        sender: mpsc::UnboundedSender<OutboundEvent>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            connected_at: now,
            sender,
            last_activity: Arc::new(RwLock::new(now)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Queue one event onto this connection
    pub fn send(&self, event: OutboundEvent) -> Result<(), CoreError> {
        self.sender.send(event).map_err(|_| CoreError::ChannelClosed)
    }

    /// Update the activity timestamp
    pub fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    /// Ask the owning worker to shut the socket down. Infallible: a
    /// superseded connection is presumed dead, so there is nothing to report.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once `close` has been called
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }
}

/// Tracks the authoritative connection per user
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, superseding and closing any prior handle for
    /// the same user. The insert itself is atomic; the old handle's close is
    /// fire-and-forget.
    pub fn register(&self, handle: ConnectionHandle) {
        let user_id = handle.user_id.clone();
        if let Some(old) = self.connections.insert(user_id.clone(), handle) {
            info!(%user_id, superseded = %old.id, "connection superseded");
            old.close();
        } else {
            debug!(%user_id, "connection registered");
        }
    }

    /// Remove a connection if it is still the authoritative one.
    ///
    /// Idempotent, and a superseded worker cleaning up after itself will not
    /// evict its successor. Returns whether anything was removed.
    pub fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        self.connections
            .remove_if(user_id, |_, handle| handle.id == connection_id)
            .is_some()
    }

    /// Authoritative handle for a user, if connected
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.connections.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}
