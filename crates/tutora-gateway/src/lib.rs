//! Tutora Gateway - WebSocket control plane for real-time tutoring sessions
//!
//! Accepts one duplex connection per user, classifies inbound multi-modal
//! events, routes each to the owning downstream pipeline, and streams typed
//! responses back while preserving per-connection ordering.

mod connection;
mod gateway;
mod outbound;
mod router;
mod session;

pub use connection::{ConnectionHandle, ConnectionRegistry};
pub use gateway::{GatewayConfig, GatewayError, TutorGateway};
pub use outbound::ResponseMultiplexer;
pub use router::{MessageRouter, RouterConfig};
pub use session::SessionRegistry;
