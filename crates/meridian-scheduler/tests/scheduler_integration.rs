//! Integration tests for the full scheduler over a durable checkpoint store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use meridian_budget::BudgetManager;
use meridian_checkpoint::{
    CheckpointManager, CheckpointRepository, MemoryRepository, SqliteRepository,
};
use meridian_recovery::{RecoveryConfig, RecoveryManager};
use meridian_scheduler::{
    NodeCall, NodeExecutor, NodeOutcome, ProgressEmitter, QueryOutcome, QueryScheduler,
    SchedulerConfig,
};
use meridian_types::{NodeResult, ProgressKind, RoutingDecision, SearchBackend};

/// Executor that answers every call instantly and records which backends ran.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl NodeExecutor for RecordingExecutor {
    async fn execute(&self, call: NodeCall) -> NodeOutcome {
        let node = call.backend.node_name();
        self.calls.lock().push(node.to_string());
        NodeOutcome::success(
            NodeResult::ok(node, 25),
            json!([{"source": node, "query": call.query}]),
        )
        .with_cache_hit(false)
    }
}

fn recovery() -> RecoveryManager {
    RecoveryManager::new(RecoveryConfig {
        max_attempts: 3,
        backoff_base_secs: 0,
        backoff_cap_secs: 0,
    })
}

#[tokio::test]
async fn test_multi_search_persists_through_sqlite() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(SqliteRepository::open(&dir.path().join("meridian.db")).unwrap());
    let scheduler = QueryScheduler::new(
        Arc::new(RecordingExecutor::default()),
        BudgetManager::new(),
        recovery(),
        CheckpointManager::new(repo.clone()),
        SchedulerConfig::default(),
    );

    let report = scheduler
        .run("tp53 mutations in glioblastoma", RoutingDecision::MultiSearch)
        .await
        .expect("query failed");

    assert_eq!(report.outcome, QueryOutcome::Complete);
    assert_eq!(report.state.result_count(), 3);

    // The checkpoint survived on disk, finalized, with one metrics row.
    let checkpoint = repo.get(&report.checkpoint_id).unwrap().unwrap();
    assert!(checkpoint.is_finalized());
    assert!(!checkpoint.partial_results);
    assert_eq!(checkpoint.state_snapshot.result_count(), 3);
    assert_eq!(repo.metrics_count().unwrap(), 1);

    // Resuming a finalized checkpoint reports as-is, no re-execution.
    let resumed = scheduler.resume(&report.checkpoint_id).await.unwrap();
    assert_eq!(resumed.outcome, QueryOutcome::Complete);
    assert_eq!(repo.metrics_count().unwrap(), 1);
}

#[tokio::test]
async fn test_resume_runs_only_missing_backends() {
    let repo = Arc::new(MemoryRepository::new());
    let checkpoints = CheckpointManager::new(repo.clone());

    // Simulate an interrupted session: literature already answered,
    // checkpoint written but never finalized.
    let mut state = meridian_types::OrchestratorState::new(
        "pembrolizumab combination trials",
        RoutingDecision::MultiSearch,
    );
    state.set_backend_results(SearchBackend::Literature, json!([{"pmid": 7}]));
    state.push_node("literature-search");
    let checkpoint = checkpoints.create_checkpoint(&mut state).unwrap();
    checkpoints
        .update_checkpoint(&checkpoint.checkpoint_id, &state)
        .unwrap();

    let executor = Arc::new(RecordingExecutor::default());
    let scheduler = QueryScheduler::new(
        executor.clone(),
        BudgetManager::new(),
        recovery(),
        checkpoints,
        SchedulerConfig::default(),
    );

    let report = scheduler.resume(&checkpoint.checkpoint_id).await.unwrap();

    assert_eq!(report.outcome, QueryOutcome::Complete);
    assert_eq!(report.state.result_count(), 3);
    // The filled slot was not re-fetched.
    let ran: HashSet<String> = executor.calls().into_iter().collect();
    assert_eq!(
        ran,
        HashSet::from(["trials-search".to_string(), "semantic-search".to_string()])
    );
    // The earlier literature payload survived the resume.
    assert_eq!(report.state.literature_results, Some(json!([{"pmid": 7}])));

    let finalized = repo.get(&checkpoint.checkpoint_id).unwrap().unwrap();
    assert!(finalized.is_finalized());
}

#[tokio::test]
async fn test_progress_events_bracket_the_run() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let scheduler = QueryScheduler::new(
        Arc::new(RecordingExecutor::default()),
        BudgetManager::new(),
        recovery(),
        CheckpointManager::new(Arc::new(MemoryRepository::new())),
        SchedulerConfig::default(),
    )
    .with_progress(ProgressEmitter::new(tx));

    scheduler
        .run("tp53", RoutingDecision::SingleSearch)
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.event);
    }
    assert_eq!(
        kinds,
        vec![
            ProgressKind::NodeStarted,
            ProgressKind::NodeCompleted,
            ProgressKind::SynthesisStarted,
            ProgressKind::SynthesisCompleted,
        ]
    );
}
