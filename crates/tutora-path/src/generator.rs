//! Curriculum construction under a target-score/timeframe constraint.
//!
//! Generation is deterministic for identical inputs plus the captured
//! ability estimate: no randomness, step ids are positional.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use tutora_core::error::{CoreError, Result};
use tutora_core::pipeline::{AbilityEstimator, FixedAbility};
use tutora_core::types::{LearningPath, SkillModule, Step};

/// Valid band-score range for target scores
const BAND_MIN: f64 = 0.0;
const BAND_MAX: f64 = 9.0;

/// Longest plan horizon accepted, in days. Keeps step counts and the
/// backing allocation bounded for any accepted input.
const MAX_TIMEFRAME_DAYS: i64 = 3650;

/// Tuning knobs for path generation
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Lower bound on one step's estimated duration, minutes
    pub min_study_minutes: u32,
    /// Upper bound on one step's estimated duration, minutes
    pub max_study_minutes: u32,
    /// Preferred step duration used to size the step count
    pub ideal_step_minutes: u32,
    /// Difficulty ceiling (steps run 1..=max_difficulty)
    pub max_difficulty: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_study_minutes: 30,
            max_study_minutes: 120,
            ideal_step_minutes: 60,
            max_difficulty: 5,
        }
    }
}

/// Builds ordered, constrained learning paths
pub struct PathGenerator {
    config: GeneratorConfig,
    ability: Arc<dyn AbilityEstimator>,
}

impl Default for PathGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default(), Arc::new(FixedAbility::default()))
    }
}

impl PathGenerator {
    pub fn new(config: GeneratorConfig, ability: Arc<dyn AbilityEstimator>) -> Self {
        Self { config, ability }
    }

    /// Generate a path toward `target_score` within `timeframe_days`.
    ///
    /// Step count and pacing scale with the timeframe and with the gap
    /// between the user's ability estimate and the target: a larger gap
    /// packs more minutes per day and inserts foundation (remediation)
    /// steps before the main progression.
    pub fn generate(
        &self,
        user_id: &str,
        target_score: f64,
        timeframe_days: i64,
    ) -> Result<LearningPath> {
        if !target_score.is_finite() || !(BAND_MIN..=BAND_MAX).contains(&target_score) {
            return Err(CoreError::InvalidTarget {
                value: target_score,
            });
        }
        if timeframe_days <= 0 || timeframe_days > MAX_TIMEFRAME_DAYS {
            return Err(CoreError::InvalidTimeframe {
                value: timeframe_days.to_string(),
            });
        }

        let ability = self.ability.estimate(user_id).clamp(BAND_MIN, BAND_MAX);
        let gap = (target_score - ability).max(0.0);

        // Daily study load interpolates with the gap: four bands of
        // headroom or more means full intensity.
        let intensity = (gap / 4.0).clamp(0.0, 1.0);
        let minutes_per_day = self.config.min_study_minutes as f64
            + (self.config.max_study_minutes - self.config.min_study_minutes) as f64 * intensity;
        let total_minutes = (minutes_per_day * timeframe_days as f64).round() as u64;

        // At least one step per module; otherwise sized by the ideal length
        let step_count = (total_minutes.div_ceil(self.config.ideal_step_minutes as u64)).max(4);

        let base = total_minutes / step_count;
        let remainder = total_minutes % step_count;

        let remediation_steps = if gap > 2.0 {
            (step_count as usize / 3).min(gap.floor() as usize)
        } else {
            0
        };

        let end_difficulty = ((target_score / 2.0).ceil() as u8).clamp(1, self.config.max_difficulty);
        let start_difficulty = if remediation_steps > 0 {
            1
        } else {
            end_difficulty.saturating_sub(2).max(1)
        };

        let mut steps = Vec::with_capacity(step_count as usize);
        let mut last_in_module: [Option<usize>; 4] = [None; 4];
        let progression_len = step_count as usize - remediation_steps;

        for i in 0..step_count as usize {
            let module_idx = i % SkillModule::ALL.len();
            let module = SkillModule::ALL[module_idx];

            let (difficulty, focus) = if i < remediation_steps {
                (1, Some("foundation".to_string()))
            } else {
                let j = (i - remediation_steps) as u64;
                let span = (end_difficulty - start_difficulty) as u64;
                let denom = (progression_len as u64).saturating_sub(1).max(1);
                let difficulty = start_difficulty + (span * j / denom) as u8;
                (difficulty, None)
            };

            // Spread the rounding remainder across the earliest steps,
            // flooring tiny allocations up to the per-step minimum
            let mut minutes = base + u64::from((i as u64) < remainder);
            minutes = minutes.max(self.config.min_study_minutes as u64);

            let prerequisite_step_ids = match last_in_module[module_idx] {
                Some(prev) => vec![step_id(prev)],
                None => Vec::new(),
            };
            last_in_module[module_idx] = Some(i);

            steps.push(Step {
                step_id: step_id(i),
                module,
                difficulty,
                estimated_minutes: minutes as u32,
                prerequisite_step_ids,
                focus,
            });
        }

        debug!(
            user_id,
            target_score,
            timeframe_days,
            steps = steps.len(),
            remediation = remediation_steps,
            "generated learning path"
        );

        Ok(LearningPath {
            path_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            target_score,
            timeframe_days,
            steps,
            completed_step_ids: Default::default(),
        })
    }
}

/// Positional step id, stable across regenerations with identical inputs
fn step_id(index: usize) -> String {
    format!("step-{:02}", index + 1)
}
