//! Response multiplexing.
//!
//! Serializes handler output back onto the owning connection, in production
//! order. Results belonging to a superseded or disconnected connection are
//! dropped silently: nothing here ever raises into the pipeline that
//! produced the event.

use std::sync::Arc;

use tracing::debug;

use tutora_core::protocol::OutboundEvent;

use crate::connection::{ConnectionHandle, ConnectionRegistry};

/// Delivers outbound events to the authoritative connection for a user
#[derive(Clone)]
pub struct ResponseMultiplexer {
    connections: Arc<ConnectionRegistry>,
}

impl ResponseMultiplexer {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    /// Deliver one event produced on behalf of `origin`.
    ///
    /// Dropped when the user has no live handle, or when `origin` has been
    /// superseded by a newer connection (its in-flight results are stale).
    pub fn deliver(&self, origin: &ConnectionHandle, event: OutboundEvent) {
        match self.connections.lookup(&origin.user_id) {
            Some(live) if live.id == origin.id => {
                if live.send(event).is_err() {
                    debug!(user_id = %origin.user_id, "outbound channel closed, dropping event");
                }
            }
            Some(_) => {
                debug!(
                    user_id = %origin.user_id,
                    connection_id = %origin.id,
                    "connection superseded, dropping stale event"
                );
            }
            None => {
                debug!(user_id = %origin.user_id, "no live connection, dropping event");
            }
        }
    }

    /// Deliver a batch in order
    pub fn deliver_all<I>(&self, origin: &ConnectionHandle, events: I)
    where
        I: IntoIterator<Item = OutboundEvent>,
    {
        for event in events {
            self.deliver(origin, event);
        }
    }
}
