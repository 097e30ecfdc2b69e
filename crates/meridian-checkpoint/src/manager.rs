//! Checkpoint lifecycle: create, update, finalize, look up.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chrono::Utc;
use meridian_types::OrchestratorState;

use crate::error::{Error, Result};
use crate::repository::CheckpointRepository;
use crate::types::{Checkpoint, QueryMetricsRow};

/// Creates, updates, and finalizes durable checkpoints.
///
/// One manager per process, injected into each query's scheduler. All state
/// lives in the repository; the manager is cheap to clone.
#[derive(Clone)]
pub struct CheckpointManager {
    repo: Arc<dyn CheckpointRepository>,
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager").finish_non_exhaustive()
    }
}

impl CheckpointManager {
    pub fn new(repo: Arc<dyn CheckpointRepository>) -> Self {
        Self { repo }
    }

    /// Create the checkpoint for a fresh query.
    ///
    /// Generates a new id, records it on the state, and persists the first
    /// snapshot with no completion metadata.
    pub fn create_checkpoint(&self, state: &mut OrchestratorState) -> Result<Checkpoint> {
        let checkpoint_id = Uuid::new_v4().to_string();
        state.checkpoint_id = Some(checkpoint_id.clone());

        let checkpoint = Checkpoint {
            checkpoint_id: checkpoint_id.clone(),
            query: state.query.clone(),
            created_at: Utc::now(),
            completed_at: None,
            error_count: 0,
            partial_results: false,
            state_snapshot: state.clone(),
        };
        self.repo.put(&checkpoint)?;

        debug!(checkpoint_id = %checkpoint_id, "checkpoint created");
        Ok(checkpoint)
    }

    /// Upsert the latest state snapshot under an existing id.
    ///
    /// Idempotent overwrite; safe to call repeatedly and safe under retry.
    /// Completion metadata is untouched until finalization. Refuses to touch
    /// a finalized checkpoint.
    pub fn update_checkpoint(&self, checkpoint_id: &str, state: &OrchestratorState) -> Result<()> {
        let existing = self
            .repo
            .get(checkpoint_id)?
            .ok_or_else(|| Error::NotFound(checkpoint_id.to_string()))?;
        if existing.is_finalized() {
            return Err(Error::AlreadyFinalized(checkpoint_id.to_string()));
        }

        self.repo.put(&Checkpoint {
            state_snapshot: state.clone(),
            ..existing
        })
    }

    /// Finalize a checkpoint exactly once.
    ///
    /// Sets `completed_at`, `error_count = final_state.errors().len()`, and
    /// `partial_results = error_count > 0`. The flag is set whenever any
    /// error occurred during the query's lifetime, even if every failed
    /// backend was ultimately retried to success. Also appends one metrics
    /// row; a metrics failure is logged but never blocks the completion
    /// fields. Calling again on an already-finalized checkpoint is a no-op,
    /// so callers can retry freely.
    pub fn finalize_checkpoint(
        &self,
        checkpoint_id: &str,
        final_state: &OrchestratorState,
    ) -> Result<()> {
        let existing = self
            .repo
            .get(checkpoint_id)?
            .ok_or_else(|| Error::NotFound(checkpoint_id.to_string()))?;
        if existing.is_finalized() {
            debug!(checkpoint_id, "checkpoint already finalized, skipping");
            return Ok(());
        }

        let error_count = final_state.errors().len();
        self.repo.put(&Checkpoint {
            completed_at: Some(Utc::now()),
            error_count,
            partial_results: error_count > 0,
            state_snapshot: final_state.clone(),
            ..existing
        })?;

        info!(
            checkpoint_id,
            error_count,
            partial = error_count > 0,
            "checkpoint finalized"
        );

        // Metrics are analytics-only; a failure here must not unwind the
        // completion commit above.
        let row = QueryMetricsRow::from_state(checkpoint_id, final_state);
        if let Err(e) = self.repo.append_metrics(&row) {
            warn!(checkpoint_id, error = %e, "failed to append query metrics");
        }

        Ok(())
    }

    /// Point lookup for resumption or inspection.
    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        self.repo.get(checkpoint_id)
    }

    /// Arm a guard that finalizes the checkpoint on drop.
    ///
    /// The scheduler feeds the guard each merged state; if the scheduler
    /// errors or panics before finalizing explicitly, the drop path commits
    /// the last known state so the checkpoint is never left un-finalized.
    pub fn finalize_guard(
        &self,
        checkpoint_id: impl Into<String>,
        state: OrchestratorState,
    ) -> FinalizeGuard {
        FinalizeGuard {
            manager: self.clone(),
            checkpoint_id: checkpoint_id.into(),
            state,
            armed: true,
        }
    }
}

/// Guaranteed-cleanup path for finalization.
pub struct FinalizeGuard {
    manager: CheckpointManager,
    checkpoint_id: String,
    state: OrchestratorState,
    armed: bool,
}

impl FinalizeGuard {
    /// Record the latest merged state for the drop path.
    pub fn set_state(&mut self, state: &OrchestratorState) {
        self.state = state.clone();
    }

    /// Finalize explicitly and disarm the drop path.
    pub fn finalize(mut self, final_state: &OrchestratorState) -> Result<()> {
        self.armed = false;
        self.manager
            .finalize_checkpoint(&self.checkpoint_id, final_state)
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            checkpoint_id = %self.checkpoint_id,
            "finalize guard fired, committing last known state"
        );
        if let Err(e) = self
            .manager
            .finalize_checkpoint(&self.checkpoint_id, &self.state)
        {
            error!(
                checkpoint_id = %self.checkpoint_id,
                error = %e,
                "guard finalization failed"
            );
        }
    }
}
