//! Pluggable checkpoint storage.
//!
//! Any keyed upsert/read store plus an append-only metrics table will do.
//! [`MemoryRepository`] covers tests and ephemeral runs; the durable
//! implementation lives in [`crate::SqliteRepository`].

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::types::{Checkpoint, QueryMetricsRow};

/// Storage backend for checkpoints and metrics.
///
/// `put` is an upsert by `checkpoint_id`, last writer wins. Only the owning
/// query session's coordinator ever writes a given id, so implementations
/// need no cross-session conflict handling.
pub trait CheckpointRepository: Send + Sync {
    /// Insert or overwrite the checkpoint under its id.
    fn put(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Point lookup by id.
    fn get(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// Append one analytics row. Rows are never updated or deleted.
    fn append_metrics(&self, row: &QueryMetricsRow) -> Result<()>;
}

/// In-memory repository for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    metrics: Mutex<Vec<QueryMetricsRow>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All metrics rows appended so far, in order. Test helper.
    pub fn metrics(&self) -> Vec<QueryMetricsRow> {
        self.metrics.lock().clone()
    }
}

impl CheckpointRepository for MemoryRepository {
    fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints
            .lock()
            .insert(checkpoint.checkpoint_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn get(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.lock().get(checkpoint_id).cloned())
    }

    fn append_metrics(&self, row: &QueryMetricsRow) -> Result<()> {
        self.metrics.lock().push(row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_types::{OrchestratorState, RoutingDecision};

    fn checkpoint(id: &str) -> Checkpoint {
        Checkpoint {
            checkpoint_id: id.to_string(),
            query: "q".to_string(),
            created_at: Utc::now(),
            completed_at: None,
            error_count: 0,
            partial_results: false,
            state_snapshot: OrchestratorState::new("q", RoutingDecision::SingleSearch),
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let repo = MemoryRepository::new();
        repo.put(&checkpoint("cp-1")).unwrap();
        let found = repo.get("cp-1").unwrap().unwrap();
        assert_eq!(found.checkpoint_id, "cp-1");
        assert_eq!(found.query, "q");
        assert!(repo.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites_by_id() {
        let repo = MemoryRepository::new();
        repo.put(&checkpoint("cp-1")).unwrap();
        let mut updated = checkpoint("cp-1");
        updated.error_count = 3;
        repo.put(&updated).unwrap();
        assert_eq!(repo.get("cp-1").unwrap().unwrap().error_count, 3);
    }

    #[test]
    fn test_metrics_append_only() {
        let repo = MemoryRepository::new();
        let state = OrchestratorState::new("q", RoutingDecision::SingleSearch);
        repo.append_metrics(&QueryMetricsRow::from_state("cp-1", &state))
            .unwrap();
        repo.append_metrics(&QueryMetricsRow::from_state("cp-2", &state))
            .unwrap();
        let rows = repo.metrics();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].checkpoint_id, "cp-1");
        assert_eq!(rows[1].checkpoint_id, "cp-2");
    }
}
