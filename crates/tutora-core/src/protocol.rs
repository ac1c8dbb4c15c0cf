//! Wire protocol for the duplex tutoring connection.
//!
//! Inbound and outbound envelopes are closed tagged unions validated at the
//! boundary; an invalid shape maps directly to `UnrecognizedEvent`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{LearningPath, Recommendation, SessionSummary, SpeechAnalysis, TutorReply};

fn default_limit() -> u32 {
    5
}

fn default_timeframe() -> String {
    "30".to_string()
}

fn default_audio_format() -> String {
    "webm".to_string()
}

/// How the client is interacting for a given message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    Text,
    Voice,
}

/// Events sent from client to gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Initial handshake identifying the user
    Connect { user_id: String },
    /// Text chat turn
    UserMessage {
        message: String,
        #[serde(default)]
        interaction_mode: InteractionMode,
        #[serde(default)]
        context: serde_json::Value,
    },
    /// Audio turn; payload is base64-encoded
    AudioMessage {
        audio_data: String,
        #[serde(default = "default_audio_format")]
        format: String,
    },
    /// Adaptive content request
    GetRecommendations {
        #[serde(default)]
        module: Option<String>,
        #[serde(default = "default_limit")]
        limit: u32,
    },
    /// Curriculum generation request; timeframe arrives as a day-count string
    GetLearningPath {
        target_score: f64,
        #[serde(default = "default_timeframe")]
        timeframe: String,
    },
    /// Voice session control
    VoiceStart,
    VoiceStop,
    /// Explicitly finalize the current session
    EndSession {
        #[serde(default)]
        satisfaction: Option<f32>,
    },
}

impl InboundEvent {
    /// Parse one inbound text frame. Unknown or malformed shapes fail closed.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(|e| CoreError::unrecognized(e.to_string()))
    }

    /// Event tag, for logging and dispatch traces
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::UserMessage { .. } => "user_message",
            Self::AudioMessage { .. } => "audio_message",
            Self::GetRecommendations { .. } => "get_recommendations",
            Self::GetLearningPath { .. } => "get_learning_path",
            Self::VoiceStart => "voice_start",
            Self::VoiceStop => "voice_stop",
            Self::EndSession { .. } => "end_session",
        }
    }
}

/// Events sent from gateway to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Handshake accepted; carries the session this connection joined
    Connected { session_id: String },
    /// Multi-modal tutor reply
    TutorReply { data: TutorReply },
    /// Speech pipeline result (success or error payload)
    SpeechAnalysis { data: SpeechAnalysis },
    /// Recommendation list, at most the clamped request limit
    Recommendations { data: Vec<Recommendation> },
    /// Newly generated learning path
    LearningPath { data: LearningPath },
    /// Voice session acknowledgments
    VoiceStarted,
    VoiceProcessing,
    /// Session finalized
    SessionEnded {
        session_id: String,
        summary: SessionSummary,
    },
    /// Local failure for one event; the connection stays open
    Error { code: String, message: String },
}

impl OutboundEvent {
    /// Map a core error onto the wire
    pub fn error(err: &CoreError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_message_with_defaults() {
        let event = InboundEvent::parse(r#"{"type":"user_message","message":"hello"}"#).unwrap();
        match event {
            InboundEvent::UserMessage {
                message,
                interaction_mode,
                context,
            } => {
                assert_eq!(message, "hello");
                assert_eq!(interaction_mode, InteractionMode::Text);
                assert!(context.is_null());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_recommendations_defaults_limit() {
        let event = InboundEvent::parse(r#"{"type":"get_recommendations"}"#).unwrap();
        match event {
            InboundEvent::GetRecommendations { module, limit } => {
                assert_eq!(module, None);
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_learning_path_defaults_timeframe() {
        let event = InboundEvent::parse(r#"{"type":"get_learning_path","target_score":7.0}"#)
            .unwrap();
        match event {
            InboundEvent::GetLearningPath {
                target_score,
                timeframe,
            } => {
                assert_eq!(target_score, 7.0);
                assert_eq!(timeframe, "30");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_fails_closed() {
        let err = InboundEvent::parse(r#"{"type":"drop_tables"}"#).unwrap_err();
        assert_eq!(err.code(), "UNRECOGNIZED_EVENT");

        let err = InboundEvent::parse("not even json").unwrap_err();
        assert_eq!(err.code(), "UNRECOGNIZED_EVENT");
    }

    #[test]
    fn test_outbound_error_carries_code() {
        let event = OutboundEvent::error(&CoreError::not_found("path", "p-1"));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("NOT_FOUND"));
    }

    #[test]
    fn test_voice_events_round_trip() {
        let event = InboundEvent::parse(r#"{"type":"voice_start"}"#).unwrap();
        assert_eq!(event.tag(), "voice_start");
        let json = serde_json::to_string(&OutboundEvent::VoiceStarted).unwrap();
        assert_eq!(json, r#"{"type":"voice_started"}"#);
    }
}
