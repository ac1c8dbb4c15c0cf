//! Per-user current learning path, with idempotent progress updates.

use dashmap::DashMap;
use tracing::{debug, info};

use tutora_core::error::{CoreError, Result};
use tutora_core::types::LearningPath;

/// Tracks the single authoritative path per user.
///
/// Installing a new path supersedes the prior one entirely; completed step
/// ids are not carried over.
#[derive(Debug, Default)]
pub struct PathStore {
    paths: DashMap<String, LearningPath>,
}

impl PathStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly generated path, replacing any prior path for the user
    pub fn install(&self, path: LearningPath) {
        if let Some(old) = self.paths.insert(path.user_id.clone(), path) {
            info!(user_id = %old.user_id, old_path = %old.path_id, "replaced learning path");
        }
    }

    /// Current path for a user, if one has been generated
    pub fn current(&self, user_id: &str) -> Option<LearningPath> {
        self.paths.get(user_id).map(|entry| entry.value().clone())
    }

    /// Mark one step complete.
    ///
    /// Idempotent: re-marking an already-completed step is a no-op. Steps and
    /// their ordering are never touched. Fails with `NotFound` when the path
    /// or step id is unknown.
    pub fn update_progress(
        &self,
        user_id: &str,
        path_id: &str,
        completed_step_id: &str,
    ) -> Result<LearningPath> {
        let mut entry = self
            .paths
            .get_mut(user_id)
            .ok_or_else(|| CoreError::not_found("path", path_id))?;
        if entry.path_id != path_id {
            return Err(CoreError::not_found("path", path_id));
        }
        if !entry.has_step(completed_step_id) {
            return Err(CoreError::not_found("step", completed_step_id));
        }

        if entry.completed_step_ids.insert(completed_step_id.to_string()) {
            debug!(user_id, path_id, step_id = completed_step_id, "step completed");
        }
        Ok(entry.clone())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
