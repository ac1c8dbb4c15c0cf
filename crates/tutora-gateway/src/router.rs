//! Inbound event dispatch.
//!
//! Classifies one event by its tag and routes it to exactly one handler.
//! Handler failures never terminate the connection: they come back as a
//! single outbound error event and the worker keeps consuming.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use tutora_cache::{RecommendationCache, RecommendationKey};
use tutora_core::error::{CoreError, Result};
use tutora_core::pipeline::{DialogueEngine, RecommendationSource, SpeechAnalyzer};
use tutora_core::protocol::{InboundEvent, OutboundEvent};
use tutora_core::types::{SkillModule, SpeechAnalysis, TutorReply};
use tutora_path::{PathGenerator, PathStore};

use crate::session::SessionRegistry;

/// Caller-supplied recommendation limits are clamped into this band
const LIMIT_BAND: std::ops::RangeInclusive<u32> = 1..=20;

/// Timeouts and sizing for the dispatch table
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Bound on one dialogue pipeline call
    pub chat_timeout: Duration,
    /// Bound on one speech pipeline call
    pub audio_timeout: Duration,
    /// TTL for cached recommendation results
    pub recommendation_ttl: chrono::Duration,
    /// Hard cap on returned recommendation items
    pub max_recommendations: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            chat_timeout: Duration::from_secs(10),
            audio_timeout: Duration::from_secs(20),
            recommendation_ttl: chrono::Duration::seconds(300),
            max_recommendations: 20,
        }
    }
}

/// Routes inbound events to the owning pipeline or component
pub struct MessageRouter {
    dialogue: Arc<dyn DialogueEngine>,
    speech: Arc<dyn SpeechAnalyzer>,
    recommendations: Arc<dyn RecommendationSource>,
    cache: Arc<RecommendationCache>,
    generator: Arc<PathGenerator>,
    paths: Arc<PathStore>,
    sessions: Arc<SessionRegistry>,
    config: RouterConfig,
}

impl MessageRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dialogue: Arc<dyn DialogueEngine>,
        speech: Arc<dyn SpeechAnalyzer>,
        recommendations: Arc<dyn RecommendationSource>,
        cache: Arc<RecommendationCache>,
        generator: Arc<PathGenerator>,
        paths: Arc<PathStore>,
        sessions: Arc<SessionRegistry>,
        config: RouterConfig,
    ) -> Self {
        Self {
            dialogue,
            speech,
            recommendations,
            cache,
            generator,
            paths,
            sessions,
            config,
        }
    }

    /// Route one inbound event for a known user.
    ///
    /// Returns the outbound events to deliver, in production order. A
    /// handler failure maps to a single error event; the connection stays
    /// open either way.
    #[instrument(skip(self, event), fields(tag = event.tag()))]
    pub async fn route(
        &self,
        user_id: &str,
        session_id: &str,
        event: InboundEvent,
    ) -> Vec<OutboundEvent> {
        // Lifecycle frames are not interaction turns
        let counts_as_turn = !matches!(
            event,
            InboundEvent::Connect { .. } | InboundEvent::EndSession { .. }
        );
        if counts_as_turn {
            if let Err(e) = self.sessions.record_turn(session_id) {
                debug!(session_id, "turn not recorded: {e}");
            }
        }

        let result = match event {
            InboundEvent::Connect { .. } => Err(CoreError::unrecognized(
                "connect is only valid as the first frame",
            )),
            InboundEvent::UserMessage {
                message, context, ..
            } => self.handle_chat(user_id, &message, &context).await,
            InboundEvent::AudioMessage { audio_data, format } => {
                self.handle_audio(user_id, &audio_data, &format).await
            }
            InboundEvent::GetRecommendations { module, limit } => {
                self.handle_recommendations(user_id, module, limit).await
            }
            InboundEvent::GetLearningPath {
                target_score,
                timeframe,
            } => {
                self.handle_learning_path(user_id, target_score, &timeframe)
                    .await
            }
            InboundEvent::VoiceStart => Ok(vec![OutboundEvent::VoiceStarted]),
            InboundEvent::VoiceStop => Ok(vec![OutboundEvent::VoiceProcessing]),
            InboundEvent::EndSession { satisfaction } => self
                .sessions
                .end(session_id, satisfaction)
                .map(|summary| {
                    vec![OutboundEvent::SessionEnded {
                        session_id: session_id.to_string(),
                        summary,
                    }]
                }),
        };

        match result {
            Ok(events) => events,
            Err(e) => {
                warn!(user_id, code = e.code(), "event handling failed: {e}");
                vec![OutboundEvent::error(&e)]
            }
        }
    }

    async fn handle_chat(
        &self,
        user_id: &str,
        message: &str,
        context: &serde_json::Value,
    ) -> Result<Vec<OutboundEvent>> {
        Ok(vec![self.call_dialogue(user_id, message, context).await?])
    }

    /// Dialogue call under its bound; a timeout degrades rather than fails
    async fn call_dialogue(
        &self,
        user_id: &str,
        message: &str,
        context: &serde_json::Value,
    ) -> Result<OutboundEvent> {
        match timeout(
            self.config.chat_timeout,
            self.dialogue.chat(user_id, message, context),
        )
        .await
        {
            Ok(Ok(reply)) => Ok(OutboundEvent::TutorReply { data: reply }),
            Ok(Err(e)) => Err(CoreError::downstream("dialogue", e.to_string())),
            Err(_) => {
                warn!(
                    user_id,
                    waited_ms = self.config.chat_timeout.as_millis() as u64,
                    "dialogue pipeline timed out, degrading reply"
                );
                Ok(OutboundEvent::TutorReply {
                    data: TutorReply::degraded(
                        "I could not put a full reply together in time. \
                         Could you try that again?",
                    ),
                })
            }
        }
    }

    /// Audio: analysis first, then a follow-up reply when the analysis
    /// carries signal. A speech failure emits one analysis error payload.
    async fn handle_audio(
        &self,
        user_id: &str,
        audio_data: &str,
        format: &str,
    ) -> Result<Vec<OutboundEvent>> {
        let bytes = BASE64
            .decode(audio_data)
            .map_err(|e| CoreError::unrecognized(format!("invalid base64 audio payload: {e}")))?;

        let analysis = match timeout(
            self.config.audio_timeout,
            self.speech.process_audio(&bytes, user_id, format),
        )
        .await
        {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                warn!(user_id, "speech pipeline failed: {e}");
                return Ok(vec![OutboundEvent::SpeechAnalysis {
                    data: SpeechAnalysis::failed(e.to_string()),
                }]);
            }
            Err(_) => {
                let err = CoreError::DownstreamTimeout {
                    pipeline: "speech",
                    waited_ms: self.config.audio_timeout.as_millis() as u64,
                };
                warn!(user_id, "{err}");
                return Ok(vec![OutboundEvent::SpeechAnalysis {
                    data: SpeechAnalysis::failed(err.to_string()),
                }]);
            }
        };

        let mut events = vec![OutboundEvent::SpeechAnalysis {
            data: analysis.clone(),
        }];
        if !analysis.is_empty() {
            let context = json!({ "speech_analysis": analysis });
            // The analysis already succeeded; a follow-up dialogue failure
            // stays local and must not discard it
            match self
                .call_dialogue(user_id, &analysis.transcript, &context)
                .await
            {
                Ok(reply) => events.push(reply),
                Err(e) => {
                    warn!(user_id, code = e.code(), "follow-up reply failed: {e}");
                    events.push(OutboundEvent::error(&e));
                }
            }
        }
        Ok(events)
    }

    /// Cache-first recommendations with single-flight population on miss
    async fn handle_recommendations(
        &self,
        user_id: &str,
        module: Option<String>,
        limit: u32,
    ) -> Result<Vec<OutboundEvent>> {
        let module = match module {
            Some(raw) => Some(
                SkillModule::parse(&raw)
                    .ok_or_else(|| CoreError::unrecognized(format!("unknown module: {raw}")))?,
            ),
            None => None,
        };
        let limit = (limit.clamp(*LIMIT_BAND.start(), *LIMIT_BAND.end()) as usize)
            .min(self.config.max_recommendations);

        let key = RecommendationKey {
            user_id: user_id.to_string(),
            module,
            limit,
        };
        let source = Arc::clone(&self.recommendations);
        let owner = user_id.to_string();
        let mut items = self
            .cache
            .get_or_compute(key, self.config.recommendation_ttl, move || async move {
                source.recommend(&owner, module, limit).await
            })
            .await?;
        items.truncate(limit);

        Ok(vec![OutboundEvent::Recommendations { data: items }])
    }

    /// Generate and install a path; any prior path for the user is replaced
    async fn handle_learning_path(
        &self,
        user_id: &str,
        target_score: f64,
        timeframe: &str,
    ) -> Result<Vec<OutboundEvent>> {
        let timeframe_days: i64 = timeframe.trim().parse().map_err(|_| {
            CoreError::InvalidTimeframe {
                value: timeframe.to_string(),
            }
        })?;

        let path = self
            .generator
            .generate(user_id, target_score, timeframe_days)?;
        self.paths.install(path.clone());
        // The curriculum changed; cached adaptive content is now stale
        self.cache.invalidate_user(user_id);

        Ok(vec![OutboundEvent::LearningPath { data: path }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tutora_core::pipeline::FixedAbility;
    use tutora_core::types::Recommendation;
    use tutora_path::GeneratorConfig;

    struct EchoDialogue {
        delay: Duration,
    }

    #[async_trait]
    impl DialogueEngine for EchoDialogue {
        async fn chat(
            &self,
            _user_id: &str,
            message: &str,
            _context: &serde_json::Value,
        ) -> Result<TutorReply> {
            tokio::time::sleep(self.delay).await;
            Ok(TutorReply::text_only(format!("about: {message}")))
        }
    }

    struct RefusingDialogue;

    #[async_trait]
    impl DialogueEngine for RefusingDialogue {
        async fn chat(
            &self,
            _user_id: &str,
            _message: &str,
            _context: &serde_json::Value,
        ) -> Result<TutorReply> {
            Err(CoreError::downstream("dialogue", "backend unavailable"))
        }
    }

    enum SpeechBehavior {
        Transcribe,
        Fail,
    }

    struct StubSpeech {
        behavior: SpeechBehavior,
    }

    #[async_trait]
    impl SpeechAnalyzer for StubSpeech {
        async fn process_audio(
            &self,
            audio: &[u8],
            _user_id: &str,
            _format: &str,
        ) -> Result<SpeechAnalysis> {
            match self.behavior {
                SpeechBehavior::Transcribe => Ok(SpeechAnalysis {
                    transcript: format!("{} bytes of speech", audio.len()),
                    fluency_score: Some(6.5),
                    pronunciation_score: Some(7.0),
                    feedback: None,
                    error: None,
                }),
                SpeechBehavior::Fail => {
                    Err(CoreError::downstream("speech", "undecodable payload"))
                }
            }
        }
    }

    struct CountingRecs {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecommendationSource for CountingRecs {
        async fn recommend(
            &self,
            _user_id: &str,
            module: Option<SkillModule>,
            limit: usize,
        ) -> Result<Vec<Recommendation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let module = module.unwrap_or(SkillModule::Reading);
            Ok((0..limit)
                .map(|i| Recommendation {
                    content_id: format!("{}-{}", module.as_str(), i),
                    module,
                    title: format!("Exercise {i}"),
                    difficulty: 3,
                    reason: None,
                })
                .collect())
        }
    }

    struct Fixture {
        router: MessageRouter,
        sessions: Arc<SessionRegistry>,
        paths: Arc<PathStore>,
        recs: Arc<CountingRecs>,
    }

    fn fixture(chat_delay: Duration, speech: SpeechBehavior, config: RouterConfig) -> Fixture {
        let sessions = Arc::new(SessionRegistry::new());
        let paths = Arc::new(PathStore::new());
        let recs = Arc::new(CountingRecs {
            calls: AtomicUsize::new(0),
        });
        let router = MessageRouter::new(
            Arc::new(EchoDialogue { delay: chat_delay }),
            Arc::new(StubSpeech { behavior: speech }),
            Arc::clone(&recs) as Arc<dyn RecommendationSource>,
            Arc::new(RecommendationCache::new()),
            Arc::new(PathGenerator::new(
                GeneratorConfig::default(),
                Arc::new(FixedAbility(5.0)),
            )),
            Arc::clone(&paths),
            Arc::clone(&sessions),
            config,
        );
        Fixture {
            router,
            sessions,
            paths,
            recs,
        }
    }

    fn default_fixture() -> Fixture {
        fixture(
            Duration::ZERO,
            SpeechBehavior::Transcribe,
            RouterConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_chat_produces_reply_and_counts_turn() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::parse(r#"{"type":"user_message","message":"tenses"}"#).unwrap(),
            )
            .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            OutboundEvent::TutorReply { data } => {
                assert_eq!(data.text, "about: tenses");
                assert!(!data.degraded);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(f.sessions.get(&session_id).unwrap().turn_count, 1);
    }

    #[tokio::test]
    async fn test_chat_timeout_degrades_instead_of_failing() {
        let config = RouterConfig {
            chat_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let f = fixture(
            Duration::from_millis(200),
            SpeechBehavior::Transcribe,
            config,
        );
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::parse(r#"{"type":"user_message","message":"hi"}"#).unwrap(),
            )
            .await;

        match &events[0] {
            OutboundEvent::TutorReply { data } => assert!(data.degraded),
            other => panic!("expected degraded reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_audio_emits_analysis_then_reply() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");
        let payload = BASE64.encode(b"pretend-opus-frames");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::AudioMessage {
                    audio_data: payload,
                    format: "opus".to_string(),
                },
            )
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], OutboundEvent::SpeechAnalysis { .. }));
        assert!(matches!(events[1], OutboundEvent::TutorReply { .. }));
    }

    #[tokio::test]
    async fn test_audio_keeps_analysis_when_followup_reply_fails() {
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(
            Arc::new(RefusingDialogue),
            Arc::new(StubSpeech {
                behavior: SpeechBehavior::Transcribe,
            }),
            Arc::new(CountingRecs {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(RecommendationCache::new()),
            Arc::new(PathGenerator::new(
                GeneratorConfig::default(),
                Arc::new(FixedAbility(5.0)),
            )),
            Arc::new(PathStore::new()),
            Arc::clone(&sessions),
            RouterConfig::default(),
        );
        let session_id = sessions.start("u1");

        let events = router
            .route(
                "u1",
                &session_id,
                InboundEvent::AudioMessage {
                    audio_data: BASE64.encode(b"pretend-opus-frames"),
                    format: "opus".to_string(),
                },
            )
            .await;

        // The successful analysis survives; the dialogue failure follows it
        assert_eq!(events.len(), 2);
        match &events[0] {
            OutboundEvent::SpeechAnalysis { data } => assert!(data.error.is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
        match &events[1] {
            OutboundEvent::Error { code, .. } => assert_eq!(code, "DOWNSTREAM_FAILURE"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scenario_c_speech_failure_keeps_connection_usable() {
        let f = fixture(
            Duration::ZERO,
            SpeechBehavior::Fail,
            RouterConfig::default(),
        );
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::AudioMessage {
                    audio_data: BASE64.encode(b"garbage"),
                    format: "webm".to_string(),
                },
            )
            .await;

        // Exactly one analysis error payload, no follow-up reply
        assert_eq!(events.len(), 1);
        match &events[0] {
            OutboundEvent::SpeechAnalysis { data } => assert!(data.error.is_some()),
            other => panic!("unexpected event: {:?}", other),
        }

        // A subsequent chat message is still processed normally
        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::parse(r#"{"type":"user_message","message":"still here"}"#).unwrap(),
            )
            .await;
        assert!(matches!(events[0], OutboundEvent::TutorReply { .. }));
    }

    #[tokio::test]
    async fn test_invalid_base64_fails_closed_without_pipeline_call() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::AudioMessage {
                    audio_data: "!!! not base64 !!!".to_string(),
                    format: "webm".to_string(),
                },
            )
            .await;

        match &events[0] {
            OutboundEvent::Error { code, .. } => assert_eq!(code, "UNRECOGNIZED_EVENT"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scenario_a_recommendations_cached_within_ttl() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");
        let request =
            r#"{"type":"get_recommendations","module":"reading","limit":3}"#;

        let first = f
            .router
            .route("u1", &session_id, InboundEvent::parse(request).unwrap())
            .await;
        let second = f
            .router
            .route("u1", &session_id, InboundEvent::parse(request).unwrap())
            .await;

        let items = |events: &[OutboundEvent]| match &events[0] {
            OutboundEvent::Recommendations { data } => data.clone(),
            other => panic!("unexpected event: {:?}", other),
        };
        let first_items = items(&first);
        assert!(first_items.len() <= 3);
        assert_eq!(first_items, items(&second));
        assert_eq!(f.recs.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recommendation_limit_clamped() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::GetRecommendations {
                    module: None,
                    limit: 500,
                },
            )
            .await;

        match &events[0] {
            OutboundEvent::Recommendations { data } => assert_eq!(data.len(), 20),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_module_is_rejected_at_boundary() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::GetRecommendations {
                    module: Some("astrology".to_string()),
                    limit: 5,
                },
            )
            .await;

        match &events[0] {
            OutboundEvent::Error { code, .. } => assert_eq!(code, "UNRECOGNIZED_EVENT"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(f.recs.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_b_new_path_replaces_prior() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");

        let first = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::parse(
                    r#"{"type":"get_learning_path","target_score":7.0,"timeframe":"14"}"#,
                )
                .unwrap(),
            )
            .await;
        let first_path = match &first[0] {
            OutboundEvent::LearningPath { data } => data.clone(),
            other => panic!("unexpected event: {:?}", other),
        };
        f.paths
            .update_progress("u1", &first_path.path_id, &first_path.steps[0].step_id)
            .unwrap();

        let second = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::parse(
                    r#"{"type":"get_learning_path","target_score":7.0,"timeframe":"60"}"#,
                )
                .unwrap(),
            )
            .await;
        let second_path = match &second[0] {
            OutboundEvent::LearningPath { data } => data.clone(),
            other => panic!("unexpected event: {:?}", other),
        };

        assert_ne!(first_path.path_id, second_path.path_id);
        assert!(second_path.completed_step_ids.is_empty());
        let current = f.paths.current("u1").unwrap();
        assert_eq!(current.path_id, second_path.path_id);
    }

    #[tokio::test]
    async fn test_bad_path_inputs_report_without_mutation() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::GetLearningPath {
                    target_score: 7.0,
                    timeframe: "soon".to_string(),
                },
            )
            .await;
        match &events[0] {
            OutboundEvent::Error { code, .. } => assert_eq!(code, "INVALID_TIMEFRAME"),
            other => panic!("unexpected event: {:?}", other),
        }

        // A numeric but absurd horizon is rejected the same way
        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::GetLearningPath {
                    target_score: 7.0,
                    timeframe: "9223372036854775807".to_string(),
                },
            )
            .await;
        match &events[0] {
            OutboundEvent::Error { code, .. } => assert_eq!(code, "INVALID_TIMEFRAME"),
            other => panic!("unexpected event: {:?}", other),
        }

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::GetLearningPath {
                    target_score: 12.0,
                    timeframe: "30".to_string(),
                },
            )
            .await;
        match &events[0] {
            OutboundEvent::Error { code, .. } => assert_eq!(code, "INVALID_TARGET"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(f.paths.current("u1").is_none());
    }

    #[tokio::test]
    async fn test_end_session_returns_summary() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");
        f.router
            .route(
                "u1",
                &session_id,
                InboundEvent::parse(r#"{"type":"user_message","message":"hi"}"#).unwrap(),
            )
            .await;

        let events = f
            .router
            .route(
                "u1",
                &session_id,
                InboundEvent::parse(r#"{"type":"end_session","satisfaction":4.5}"#).unwrap(),
            )
            .await;

        match &events[0] {
            OutboundEvent::SessionEnded { summary, .. } => {
                assert_eq!(summary.turn_count, 1);
                assert_eq!(summary.satisfaction_score, Some(4.5));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(f.sessions.active_for("u1").is_none());
    }

    #[tokio::test]
    async fn test_voice_control_acknowledgments() {
        let f = default_fixture();
        let session_id = f.sessions.start("u1");

        let events = f
            .router
            .route("u1", &session_id, InboundEvent::VoiceStart)
            .await;
        assert!(matches!(events[0], OutboundEvent::VoiceStarted));

        let events = f
            .router
            .route("u1", &session_id, InboundEvent::VoiceStop)
            .await;
        assert!(matches!(events[0], OutboundEvent::VoiceProcessing));
    }
}
