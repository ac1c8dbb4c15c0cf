//! Error taxonomy for the orchestration core.
//!
//! Every failure here is local to one event: it is reported back to the
//! client as an `error` event with a stable code and never terminates the
//! owning connection or the process.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or unknown inbound event
    #[error("unrecognized event: {detail}")]
    UnrecognizedEvent { detail: String },

    /// A downstream pipeline exceeded its time bound
    #[error("{pipeline} pipeline timed out after {waited_ms}ms")]
    DownstreamTimeout { pipeline: &'static str, waited_ms: u64 },

    /// A downstream pipeline returned an error
    #[error("{pipeline} pipeline failed: {message}")]
    DownstreamFailure {
        pipeline: &'static str,
        message: String,
    },

    /// Unknown session, path, or step
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Target score outside the valid band-score range
    #[error("invalid target score: {value}")]
    InvalidTarget { value: f64 },

    /// Non-positive or unparseable timeframe
    #[error("invalid timeframe: {value}")]
    InvalidTimeframe { value: String },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbound channel closed (connection gone)
    #[error("channel closed")]
    ChannelClosed,
}

impl CoreError {
    /// Create an unrecognized-event error
    pub fn unrecognized(detail: impl Into<String>) -> Self {
        Self::UnrecognizedEvent {
            detail: detail.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Create a downstream-failure error
    pub fn downstream(pipeline: &'static str, message: impl Into<String>) -> Self {
        Self::DownstreamFailure {
            pipeline,
            message: message.into(),
        }
    }

    /// Stable code reported on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnrecognizedEvent { .. } => "UNRECOGNIZED_EVENT",
            Self::DownstreamTimeout { .. } => "DOWNSTREAM_TIMEOUT",
            Self::DownstreamFailure { .. } => "DOWNSTREAM_FAILURE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTarget { .. } => "INVALID_TARGET",
            Self::InvalidTimeframe { .. } => "INVALID_TIMEFRAME",
            Self::Serialization(_) => "SERIALIZATION",
            Self::ChannelClosed => "CHANNEL_CLOSED",
        }
    }
}

/// Core result type
pub type Result<T> = std::result::Result<T, CoreError>;
