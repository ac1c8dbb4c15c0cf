//! Domain types: sessions, learning paths, recommendations, pipeline payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// The four skill modules a tutoring path covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillModule {
    Listening,
    Reading,
    Writing,
    Speaking,
}

impl SkillModule {
    /// All modules in canonical scheduling order
    pub const ALL: [SkillModule; 4] = [
        SkillModule::Listening,
        SkillModule::Reading,
        SkillModule::Writing,
        SkillModule::Speaking,
    ];

    /// Parse a wire-level module name; unknown names are rejected at the boundary
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "listening" => Some(Self::Listening),
            "reading" => Some(Self::Reading),
            "writing" => Some(Self::Writing),
            "speaking" => Some(Self::Speaking),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listening => "listening",
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Speaking => "speaking",
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// One logical tutoring session for a user.
///
/// Independent of how many connections it spans; immutable once ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub turn_count: u32,
    pub satisfaction_score: Option<f32>,
    /// Set when a newer session for the same user implicitly superseded this one
    #[serde(default)]
    pub abandoned: bool,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Create a new active session for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            started_at: now,
            ended_at: None,
            status: SessionStatus::Active,
            turn_count: 0,
            satisfaction_score: None,
            abandoned: false,
            last_activity: now,
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// End the session. No-op if already ended.
    pub fn end(&mut self, satisfaction: Option<f32>) {
        if self.status == SessionStatus::Ended {
            return;
        }
        self.status = SessionStatus::Ended;
        self.ended_at = Some(Utc::now());
        self.satisfaction_score = satisfaction;
    }

    /// Mark the session abandoned by a newer session for the same user
    pub fn abandon(&mut self) {
        if self.status == SessionStatus::Ended {
            return;
        }
        self.abandoned = true;
        self.end(None);
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Summary returned to callers of `end`
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            turn_count: self.turn_count,
            satisfaction_score: self.satisfaction_score,
            abandoned: self.abandoned,
        }
    }
}

/// Immutable view of an ended (or ending) session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub turn_count: u32,
    pub satisfaction_score: Option<f32>,
    #[serde(default)]
    pub abandoned: bool,
}

/// One recommended content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub content_id: String,
    pub module: SkillModule,
    pub title: String,
    /// 1 (foundation) ..= 5 (advanced)
    pub difficulty: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One scheduled unit of study within a learning path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub module: SkillModule,
    /// 1 (foundation) ..= 5 (advanced); non-decreasing across a path
    pub difficulty: u8,
    pub estimated_minutes: u32,
    #[serde(default)]
    pub prerequisite_step_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

/// An ordered, constrained curriculum toward a target score.
///
/// Steps and their ordering are immutable once generated; only
/// `completed_step_ids` grows, via the progress-update operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub path_id: String,
    pub user_id: String,
    pub target_score: f64,
    pub timeframe_days: i64,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub completed_step_ids: BTreeSet<String>,
}

impl LearningPath {
    /// Total estimated study time across all steps, in minutes
    pub fn total_estimated_minutes(&self) -> u64 {
        self.steps.iter().map(|s| s.estimated_minutes as u64).sum()
    }

    /// Whether a step id belongs to this path
    pub fn has_step(&self, step_id: &str) -> bool {
        self.steps.iter().any(|s| s.step_id == step_id)
    }

    /// Check that every step's prerequisites appear earlier in the sequence
    pub fn is_topologically_ordered(&self) -> bool {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for step in &self.steps {
            if !step
                .prerequisite_step_ids
                .iter()
                .all(|p| seen.contains(p.as_str()))
            {
                return false;
            }
            seen.insert(&step.step_id);
        }
        true
    }
}

/// Reply produced by the dialogue pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorReply {
    pub text: String,
    /// Modalities this reply carries, e.g. "text", "voice"
    #[serde(default)]
    pub modalities: Vec<String>,
    /// Set when the reply was substituted after a pipeline timeout
    #[serde(default)]
    pub degraded: bool,
}

impl TutorReply {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            modalities: vec!["text".to_string()],
            degraded: false,
        }
    }

    /// Degraded placeholder emitted when the dialogue pipeline times out
    pub fn degraded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            modalities: vec!["text".to_string()],
            degraded: true,
        }
    }
}

/// Result of the speech pipeline for one audio payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechAnalysis {
    #[serde(default)]
    pub transcript: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fluency_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pronunciation_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Present when the analyzer could not process the payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeechAnalysis {
    /// Analysis payload for a failed or timed-out speech pipeline call
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            transcript: String::new(),
            fluency_score: None,
            pronunciation_score: None,
            feedback: None,
            error: Some(message.into()),
        }
    }

    /// An empty analysis carries no signal worth a follow-up reply
    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty() || self.error.is_some()
    }
}
