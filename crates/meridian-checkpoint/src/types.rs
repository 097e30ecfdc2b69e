//! Checkpoint and metrics records.

use chrono::{DateTime, Utc};
use meridian_types::OrchestratorState;
use serde::{Deserialize, Serialize};

/// A durable, resumable snapshot of one query plus completion metadata.
///
/// Created once per query, upserted by id as the query progresses, and
/// finalized exactly once. After finalization it is treated as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_count: usize,
    /// Set at finalization whenever any error occurred during the query's
    /// lifetime, even if every failed backend was retried to success.
    pub partial_results: bool,
    pub state_snapshot: OrchestratorState,
}

impl Checkpoint {
    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// One analytics row per finalized checkpoint. Append-only; never read back
/// into orchestration logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetricsRow {
    pub checkpoint_id: String,
    pub intent: String,
    /// Max of recorded per-node latencies, since branches run in parallel.
    pub total_latency_ms: u64,
    /// Count of non-null per-backend result slots.
    pub result_count: usize,
    pub error_count: usize,
    pub answered: bool,
    pub finalized_at: DateTime<Utc>,
}

impl QueryMetricsRow {
    /// Derive the row from a finalized state.
    pub fn from_state(checkpoint_id: &str, state: &OrchestratorState) -> Self {
        Self {
            checkpoint_id: checkpoint_id.to_string(),
            intent: state
                .frame
                .as_ref()
                .map(|f| f.intent.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            total_latency_ms: state.latencies.values().copied().max().unwrap_or(0),
            result_count: state.result_count(),
            error_count: state.errors().len(),
            answered: state.answer.is_some(),
            finalized_at: Utc::now(),
        }
    }
}
