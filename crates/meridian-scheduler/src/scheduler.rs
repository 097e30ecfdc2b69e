//! The query scheduler: fan-out, retries, budget gates, checkpoints.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meridian_budget::{BudgetManager, BudgetSummary, BudgetTracker, ResourceType};
use meridian_checkpoint::CheckpointManager;
use meridian_recovery::RecoveryManager;
use meridian_types::{
    ErrorKind, NodeError, NodeResult, OrchestratorState, ProgressKind, RoutingDecision,
    SearchBackend, StateDelta,
};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::events::ProgressEmitter;
use crate::executor::{NodeCall, NodeExecutor, NodeOutcome};

/// How a finished query session is reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Every routed backend produced results and no errors were recorded.
    Complete,
    /// Some results exist, but errors were recorded or branches were cut.
    Partial,
    /// No branch produced usable results. Carries the classification of the
    /// last recorded failure; `None` when the budget stopped the query
    /// before any backend could run.
    Failed(Option<ErrorKind>),
}

/// The caller-facing result of one query session.
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub outcome: QueryOutcome,
    pub checkpoint_id: String,
    pub state: OrchestratorState,
    pub budget: BudgetSummary,
}

/// Drives one query at a time through the resilience core.
///
/// The three managers are injected once at construction; nothing here is a
/// global. Backend calls go through the [`NodeExecutor`] seam.
pub struct QueryScheduler {
    executor: Arc<dyn NodeExecutor>,
    budget: BudgetManager,
    recovery: RecoveryManager,
    checkpoints: CheckpointManager,
    config: SchedulerConfig,
    progress: ProgressEmitter,
}

impl QueryScheduler {
    pub fn new(
        executor: Arc<dyn NodeExecutor>,
        budget: BudgetManager,
        recovery: RecoveryManager,
        checkpoints: CheckpointManager,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            budget,
            recovery,
            checkpoints,
            config,
            progress: ProgressEmitter::disabled(),
        }
    }

    /// Attach a progress event subscriber.
    pub fn with_progress(mut self, progress: ProgressEmitter) -> Self {
        self.progress = progress;
        self
    }

    /// The backends a routing decision fans out to.
    fn plan(routing: RoutingDecision) -> Vec<SearchBackend> {
        match routing {
            RoutingDecision::SingleSearch => vec![SearchBackend::Literature],
            RoutingDecision::MultiSearch => vec![
                SearchBackend::Literature,
                SearchBackend::Trials,
                SearchBackend::Semantic,
            ],
        }
    }

    /// Run one query to completion.
    pub async fn run(&self, query: &str, routing: RoutingDecision) -> Result<QueryReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("empty query".to_string()));
        }

        let mut state = OrchestratorState::new(query, routing);
        state
            .config
            .insert("limit".to_string(), json!(self.config.result_limit));
        self.checkpoints.create_checkpoint(&mut state)?;

        info!(query, ?routing, session_id = %state.session_id, "query started");
        self.execute_plan(state, Self::plan(routing)).await
    }

    /// Resume an interrupted query from its checkpoint.
    ///
    /// Backends whose result slots are already filled are not re-run; a
    /// finalized checkpoint is reported as-is, never re-executed. The resumed
    /// session gets a fresh budget tracker.
    pub async fn resume(&self, checkpoint_id: &str) -> Result<QueryReport> {
        let checkpoint = self
            .checkpoints
            .get_checkpoint(checkpoint_id)?
            .ok_or_else(|| Error::UnknownCheckpoint(checkpoint_id.to_string()))?;

        let finalized = checkpoint.is_finalized();
        let state = checkpoint.state_snapshot;
        if finalized {
            debug!(checkpoint_id, "checkpoint already finalized, reporting as-is");
            let tracker = self.create_tracker();
            let planned = Self::plan(state.routing_decision).len();
            let outcome = Self::outcome_for(&state, planned);
            return Ok(QueryReport {
                outcome,
                checkpoint_id: checkpoint_id.to_string(),
                budget: self.budget.budget_summary(&tracker),
                state,
            });
        }

        let remaining: Vec<SearchBackend> = Self::plan(state.routing_decision)
            .into_iter()
            .filter(|backend| state.backend_results(*backend).is_none())
            .collect();

        info!(checkpoint_id, remaining = remaining.len(), "resuming query");
        self.execute_plan(state, remaining).await
    }

    fn create_tracker(&self) -> Arc<BudgetTracker> {
        Arc::new(self.budget.create_tracker(
            self.config.time_budget_ms,
            self.config.token_budget,
            self.config.request_budget,
        ))
    }

    /// Fan the plan out, merge branch deltas at the single-writer barrier,
    /// checkpoint every transition, and finalize through the guard.
    async fn execute_plan(
        &self,
        mut state: OrchestratorState,
        backends: Vec<SearchBackend>,
    ) -> Result<QueryReport> {
        let checkpoint_id = match &state.checkpoint_id {
            Some(id) => id.clone(),
            None => self.checkpoints.create_checkpoint(&mut state)?.checkpoint_id,
        };
        let tracker = self.create_tracker();
        let planned = Self::plan(state.routing_decision).len();
        let token = CancellationToken::new();

        // The guard finalizes with the last merged state if anything below
        // panics or errors before the explicit finalize.
        let mut guard = self
            .checkpoints
            .finalize_guard(checkpoint_id.clone(), state.clone());

        let mut branches = JoinSet::new();
        for backend in backends {
            branches.spawn(
                Branch {
                    executor: Arc::clone(&self.executor),
                    budget: self.budget.clone(),
                    recovery: self.recovery.clone(),
                    progress: self.progress.clone(),
                    tracker: Arc::clone(&tracker),
                    token: token.clone(),
                    routing: state.routing_decision,
                    query: state.query.clone(),
                    params: self.config.operation_params(),
                    max_attempts: self.config.max_attempts,
                    backend,
                }
                .run(),
            );
        }

        // Single-writer merge point: only this loop mutates the state, so
        // appends from parallel branches land atomically per delta.
        while let Some(joined) = branches.join_next().await {
            let delta = match joined {
                Ok(delta) => delta,
                Err(e) => {
                    warn!(error = %e, "branch task aborted");
                    continue;
                }
            };
            state.merge_delta(delta);

            let (status, message) = self.budget.check_budget_status(&tracker);
            if status.is_exceeded() && !token.is_cancelled() {
                warn!(?status, %message, "budget exceeded, cancelling in-flight branches");
                state.push_message(message);
                token.cancel();
            }

            guard.set_state(&state);
            self.persist_transition(&checkpoint_id, &state);
        }

        self.progress.emit(
            ProgressKind::SynthesisStarted,
            json!({
                "results": state.result_count(),
                "errors": state.errors().len(),
            }),
        );
        let outcome = Self::outcome_for(&state, planned);
        match &outcome {
            QueryOutcome::Failed(kind) => {
                self.progress.emit(
                    ProgressKind::OrchestrationFailed,
                    json!({
                        "kind": kind,
                        "errors": state.errors().len(),
                        "node_path": state.node_path(),
                    }),
                );
            }
            _ => {
                self.progress.emit(
                    ProgressKind::SynthesisCompleted,
                    json!({
                        "results": state.result_count(),
                        "budget": self.budget.budget_summary(&tracker),
                    }),
                );
            }
        }

        self.finalize(guard, &checkpoint_id, &state).await?;

        info!(
            checkpoint_id,
            ?outcome,
            results = state.result_count(),
            errors = state.errors().len(),
            "query finished"
        );

        Ok(QueryReport {
            outcome,
            checkpoint_id,
            budget: self.budget.budget_summary(&tracker),
            state,
        })
    }

    /// Checkpoint writes must not fail the query: one retry, then log and
    /// move on.
    fn persist_transition(&self, checkpoint_id: &str, state: &OrchestratorState) {
        for attempt in 0..2 {
            match self.checkpoints.update_checkpoint(checkpoint_id, state) {
                Ok(()) => return,
                Err(e) if attempt == 0 => {
                    debug!(checkpoint_id, error = %e, "checkpoint update failed, retrying")
                }
                Err(e) => {
                    warn!(checkpoint_id, error = %e, "checkpoint update failed, continuing")
                }
            }
        }
    }

    /// Finalization is retried: losing it would silently drop analytics and
    /// resumability. It never re-runs backend calls.
    async fn finalize(
        &self,
        guard: meridian_checkpoint::FinalizeGuard,
        checkpoint_id: &str,
        state: &OrchestratorState,
    ) -> Result<()> {
        let mut last = guard.finalize(state);
        for _ in 0..2 {
            if last.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            last = self.checkpoints.finalize_checkpoint(checkpoint_id, state);
        }
        last.map_err(Error::from)
    }

    fn outcome_for(state: &OrchestratorState, planned: usize) -> QueryOutcome {
        let produced = state.result_count();
        if produced == 0 {
            let kind = state.errors().last().map(|record| record.kind);
            return QueryOutcome::Failed(kind);
        }
        if !state.errors().is_empty() || produced < planned {
            QueryOutcome::Partial
        } else {
            QueryOutcome::Complete
        }
    }
}

/// One backend's attempt loop. Produces a delta; never touches shared state.
struct Branch {
    executor: Arc<dyn NodeExecutor>,
    budget: BudgetManager,
    recovery: RecoveryManager,
    progress: ProgressEmitter,
    tracker: Arc<BudgetTracker>,
    token: CancellationToken,
    routing: RoutingDecision,
    query: String,
    params: Value,
    max_attempts: u32,
    backend: SearchBackend,
}

impl Branch {
    async fn run(self) -> StateDelta {
        let node = self.backend.node_name();
        let mut delta = StateDelta::new();
        let mut attempt: u32 = 1;

        loop {
            if self.token.is_cancelled() {
                delta.node_path.push(format!("{node}_cancelled"));
                delta
                    .messages
                    .push(format!("{node}: cancelled before attempt {attempt}"));
                break;
            }

            // Affordability gate. Insufficient budget is not an error: the
            // branch just does not run, and the query proceeds with whatever
            // results already exist.
            if !self
                .budget
                .can_afford_operation(&self.tracker, node, &self.params)
            {
                delta.node_path.push(format!("{node}_budget_skipped"));
                delta
                    .messages
                    .push(format!("{node}: skipped, insufficient budget"));
                debug!(node, "branch skipped by affordability gate");
                break;
            }

            let cost = self.budget.estimate_operation_cost(node, &self.params);

            // The gate above is advisory under concurrency; the request slot
            // itself is reserved atomically, so two branches can never both
            // take the last one.
            if !self
                .budget
                .enforce_budget(&self.tracker, ResourceType::Requests, cost.requests)
            {
                delta.node_path.push(format!("{node}_budget_skipped"));
                delta
                    .messages
                    .push(format!("{node}: skipped, request budget exhausted"));
                break;
            }

            let deadline = self.budget.calculate_timeout(&self.tracker);

            delta.node_path.push(node.to_string());
            delta.tool_calls.push(node.to_string());
            self.progress
                .emit(ProgressKind::NodeStarted, json!({"node": node, "attempt": attempt}));

            let call = NodeCall {
                backend: self.backend,
                query: self.query.clone(),
                params: self.params.clone(),
                attempt,
            };
            let outcome = tokio::select! {
                _ = self.token.cancelled() => {
                    delta.node_path.push(format!("{node}_cancelled"));
                    delta
                        .messages
                        .push(format!("{node}: cancelled during attempt {attempt}"));
                    break;
                }
                executed = tokio::time::timeout(deadline, self.executor.execute(call)) => {
                    match executed {
                        Ok(outcome) => outcome,
                        Err(_) => NodeOutcome::failure(NodeResult::failed(
                            node,
                            deadline.as_millis() as u64,
                            NodeError::new(
                                ErrorKind::Timeout,
                                format!("deadline of {}ms exceeded", deadline.as_millis()),
                            ),
                        )),
                    }
                }
            };

            let result = outcome.result;
            delta.latencies.push((node.to_string(), result.latency_ms));
            delta.cache_hits.push((node.to_string(), outcome.cache_hit));

            // Wall clock is spent whether the call succeeded, failed, or
            // timed out. An overshoot drains the remainder atomically so the
            // exhaustion is observable and siblings get cancelled.
            if !self
                .budget
                .enforce_budget(&self.tracker, ResourceType::Time, result.latency_ms)
            {
                self.tracker.drain(ResourceType::Time);
            }

            if result.success {
                self.budget
                    .enforce_budget(&self.tracker, ResourceType::Tokens, cost.tokens);

                delta.results = Some((self.backend, result_payload(outcome.payload)));
                delta
                    .messages
                    .push(format!("{node}: succeeded on attempt {attempt}"));
                self.progress.emit(
                    ProgressKind::NodeCompleted,
                    json!({"node": node, "attempt": attempt, "latency_ms": result.latency_ms}),
                );
                break;
            }

            self.progress.emit(
                ProgressKind::SourceFailed,
                json!({"node": node, "attempt": attempt, "error": result.error_message()}),
            );

            let strategy =
                self.recovery
                    .create_strategy(&result, attempt, self.max_attempts, self.routing);
            delta
                .errors
                .push(self.recovery.recovery_record(strategy, &result, node));
            delta.node_path.push(strategy.action.marker().to_string());
            delta.messages.push(format!(
                "{node}: {} after attempt {attempt}: {}",
                strategy.action.marker(),
                result.error_message()
            ));

            if !strategy.is_retry() {
                break;
            }

            // The backoff sleep belongs here, not in the recovery manager.
            tokio::select! {
                _ = self.token.cancelled() => {
                    delta.node_path.push(format!("{node}_cancelled"));
                    delta
                        .messages
                        .push(format!("{node}: cancelled during backoff"));
                    break;
                }
                _ = tokio::time::sleep(strategy.delay()) => {}
            }
            attempt += 1;
        }

        delta
    }
}

/// A successful adapter that returns no payload still fills its slot, so
/// `result_count` and resumption see the node as done.
fn result_payload(payload: Option<Value>) -> Value {
    payload.unwrap_or(Value::Null)
}
