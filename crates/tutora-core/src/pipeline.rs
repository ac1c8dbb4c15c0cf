//! Adapter traits for the downstream pipelines.
//!
//! The core consumes these collaborators through narrow interfaces; concrete
//! implementations live with the deployment (see the server crate's built-in
//! adapters). Every call site wraps these in a bounded timeout.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Recommendation, SkillModule, SpeechAnalysis, TutorReply};

/// Dialogue engine producing tutor replies
#[async_trait]
pub trait DialogueEngine: Send + Sync {
    async fn chat(
        &self,
        user_id: &str,
        message: &str,
        context: &serde_json::Value,
    ) -> Result<TutorReply>;
}

/// Speech analyzer turning audio into a transcript plus scoring signal
#[async_trait]
pub trait SpeechAnalyzer: Send + Sync {
    async fn process_audio(
        &self,
        audio: &[u8],
        user_id: &str,
        format: &str,
    ) -> Result<SpeechAnalysis>;
}

/// Source of adaptive content recommendations
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn recommend(
        &self,
        user_id: &str,
        module: Option<SkillModule>,
        limit: usize,
    ) -> Result<Vec<Recommendation>>;
}

/// Captured ability estimate feeding learning-path generation.
///
/// Injected so generation stays deterministic and test-controllable.
pub trait AbilityEstimator: Send + Sync {
    fn estimate(&self, user_id: &str) -> f64;
}

/// Fixed-value estimator used when no assessment history is wired in
#[derive(Debug, Clone, Copy)]
pub struct FixedAbility(pub f64);

impl Default for FixedAbility {
    fn default() -> Self {
        // Mid-band starting assumption
        Self(5.5)
    }
}

impl AbilityEstimator for FixedAbility {
    fn estimate(&self, _user_id: &str) -> f64 {
        self.0
    }
}
