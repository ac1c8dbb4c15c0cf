//! Tutora Core - shared domain types for the tutoring orchestration plane
//!
//! Defines the wire protocol envelopes, the session and learning-path data
//! model, the error taxonomy, and the adapter traits for the downstream
//! dialogue / speech / recommendation pipelines.

pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod types;

pub use error::{CoreError, Result};
pub use pipeline::{
    AbilityEstimator, DialogueEngine, FixedAbility, RecommendationSource, SpeechAnalyzer,
};
pub use protocol::{InboundEvent, InteractionMode, OutboundEvent};
pub use types::{
    LearningPath, Recommendation, Session, SessionStatus, SessionSummary, SkillModule,
    SpeechAnalysis, Step, TutorReply,
};
