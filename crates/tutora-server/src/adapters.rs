//! Built-in pipeline adapters.
//!
//! Deployments are expected to wire real dialogue/speech backends behind the
//! core traits; these local implementations keep the server runnable on its
//! own and exercise the full event flow.

use async_trait::async_trait;

use tutora_core::error::{CoreError, Result};
use tutora_core::pipeline::{DialogueEngine, RecommendationSource, SpeechAnalyzer};
use tutora_core::types::{Recommendation, SkillModule, SpeechAnalysis, TutorReply};

/// Template-based dialogue engine
pub struct CannedDialogue;

#[async_trait]
impl DialogueEngine for CannedDialogue {
    async fn chat(
        &self,
        _user_id: &str,
        message: &str,
        context: &serde_json::Value,
    ) -> Result<TutorReply> {
        let text = if context.get("speech_analysis").is_some() {
            format!(
                "Nice work on that spoken answer. One thing to build on: \
                 try expanding \"{}\" with a supporting example.",
                truncate(message, 80)
            )
        } else {
            format!(
                "Let's look at \"{}\". Can you give me an example sentence \
                 using that idea?",
                truncate(message, 80)
            )
        };
        Ok(TutorReply::text_only(text))
    }
}

/// Duration-heuristic speech analyzer; no codec work, it only sizes the
/// payload and emits a rough scoring signal
pub struct HeuristicSpeech;

#[async_trait]
impl SpeechAnalyzer for HeuristicSpeech {
    async fn process_audio(
        &self,
        audio: &[u8],
        _user_id: &str,
        format: &str,
    ) -> Result<SpeechAnalysis> {
        if audio.is_empty() {
            return Err(CoreError::downstream("speech", "empty audio payload"));
        }
        // ~2KB/s is a crude lower bound for compressed speech
        let approx_seconds = (audio.len() as f64 / 2048.0).max(1.0);
        Ok(SpeechAnalysis {
            transcript: format!(
                "[{format} clip, roughly {:.0}s of speech]",
                approx_seconds
            ),
            fluency_score: Some(6.0),
            pronunciation_score: Some(6.0),
            feedback: Some("Keep a steady pace and stress the key words.".to_string()),
            error: None,
        })
    }
}

/// Static practice catalog filtered by module and limit
pub struct CatalogRecommendations;

impl CatalogRecommendations {
    fn catalog() -> Vec<Recommendation> {
        let entry = |id: &str, module: SkillModule, title: &str, difficulty: u8| Recommendation {
            content_id: id.to_string(),
            module,
            title: title.to_string(),
            difficulty,
            reason: None,
        };
        vec![
            entry("lst-01", SkillModule::Listening, "Short dialogues: catching numbers", 1),
            entry("lst-02", SkillModule::Listening, "Lecture note-taking drill", 3),
            entry("lst-03", SkillModule::Listening, "Accent variety: fast monologues", 4),
            entry("rdg-01", SkillModule::Reading, "Skimming for headings", 2),
            entry("rdg-02", SkillModule::Reading, "True/False/Not Given traps", 3),
            entry("rdg-03", SkillModule::Reading, "Dense academic passages", 5),
            entry("wrt-01", SkillModule::Writing, "Describing a chart in 150 words", 2),
            entry("wrt-02", SkillModule::Writing, "Essay structure: position first", 3),
            entry("wrt-03", SkillModule::Writing, "Cohesion without linking-word spam", 4),
            entry("spk-01", SkillModule::Speaking, "Part 1 warm-up answers", 1),
            entry("spk-02", SkillModule::Speaking, "Two-minute topic cards", 3),
            entry("spk-03", SkillModule::Speaking, "Abstract follow-up questions", 5),
        ]
    }
}

#[async_trait]
impl RecommendationSource for CatalogRecommendations {
    async fn recommend(
        &self,
        _user_id: &str,
        module: Option<SkillModule>,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let mut items: Vec<Recommendation> = Self::catalog()
            .into_iter()
            .filter(|item| module.map_or(true, |m| item.module == m))
            .collect();
        items.truncate(limit);
        Ok(items)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
