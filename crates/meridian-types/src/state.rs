//! The orchestrator state record threaded through one query's execution.
//!
//! `errors` and `node_path` are append-only audit structures: the public API
//! only ever pushes, never removes or reorders. Parallel branches do not
//! mutate the state directly; they produce a [`StateDelta`] that the owning
//! coordinator merges at a single-writer barrier before checkpointing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::node::{ErrorKind, RecoveryAction, SearchBackend};

/// How the router decided to answer the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingDecision {
    /// One backend is expected to answer alone.
    SingleSearch,
    /// Several backends are fanned out concurrently and merged.
    MultiSearch,
}

/// Parsed query intent and entities. Opaque to the resilience core; produced
/// by the upstream query-understanding stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFrame {
    pub intent: String,
    pub entities: Vec<String>,
}

/// One recovery decision applied to the state. Never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub node: String,
    pub error: String,
    /// The classification the adapter reported at the source.
    pub kind: ErrorKind,
    pub timestamp: DateTime<Utc>,
    pub strategy: RecoveryAction,
}

/// The shared, versioned record for one in-flight query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    /// The research question as the user asked it.
    pub query: String,
    /// Free-form options (result limits, feature toggles) passed through to
    /// backend adapters.
    pub config: serde_json::Map<String, Value>,
    /// Parsed intent/entities, if the understanding stage ran.
    pub frame: Option<QueryFrame>,
    pub routing_decision: RoutingDecision,

    pub literature_results: Option<Value>,
    pub trials_results: Option<Value>,
    pub semantic_results: Option<Value>,

    /// Backend-call names in the order they were made.
    pub tool_calls_made: Vec<String>,
    /// Per-node cache hit flags.
    pub cache_hits: HashMap<String, bool>,
    /// Per-node latency in milliseconds.
    pub latencies: HashMap<String, u64>,

    errors: Vec<ErrorRecord>,
    node_path: Vec<String>,

    pub answer: Option<String>,
    pub session_id: String,
    pub checkpoint_id: Option<String>,
    /// Human-readable event log, in order.
    pub messages: Vec<String>,
}

impl OrchestratorState {
    /// Create the state for a fresh query with a new session id.
    pub fn new(query: impl Into<String>, routing_decision: RoutingDecision) -> Self {
        Self {
            query: query.into(),
            config: serde_json::Map::new(),
            frame: None,
            routing_decision,
            literature_results: None,
            trials_results: None,
            semantic_results: None,
            tool_calls_made: Vec::new(),
            cache_hits: HashMap::new(),
            latencies: HashMap::new(),
            errors: Vec::new(),
            node_path: Vec::new(),
            answer: None,
            session_id: Uuid::new_v4().to_string(),
            checkpoint_id: None,
            messages: Vec::new(),
        }
    }

    /// Append-only view of recovery decisions applied so far.
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Append-only audit trail of node and marker names.
    pub fn node_path(&self) -> &[String] {
        &self.node_path
    }

    /// Append one recovery record to the audit structures.
    pub fn push_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    /// Append one node or marker name to the audit trail.
    pub fn push_node(&mut self, name: impl Into<String>) {
        self.node_path.push(name.into());
    }

    /// Append a human-readable event message.
    pub fn push_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// The result slot for a backend, if it has been filled.
    pub fn backend_results(&self, backend: SearchBackend) -> Option<&Value> {
        match backend {
            SearchBackend::Literature => self.literature_results.as_ref(),
            SearchBackend::Trials => self.trials_results.as_ref(),
            SearchBackend::Semantic => self.semantic_results.as_ref(),
        }
    }

    /// Write a backend's result slot.
    pub fn set_backend_results(&mut self, backend: SearchBackend, results: Value) {
        match backend {
            SearchBackend::Literature => self.literature_results = Some(results),
            SearchBackend::Trials => self.trials_results = Some(results),
            SearchBackend::Semantic => self.semantic_results = Some(results),
        }
    }

    /// Number of backends that produced results.
    pub fn result_count(&self) -> usize {
        [
            &self.literature_results,
            &self.trials_results,
            &self.semantic_results,
        ]
        .iter()
        .filter(|slot| slot.is_some())
        .count()
    }

    /// Merge one branch's delta at the single-writer barrier.
    ///
    /// Appends and slot writes land atomically with respect to checkpoint
    /// snapshots because the coordinator is the only writer.
    pub fn merge_delta(&mut self, delta: StateDelta) {
        if let Some((backend, results)) = delta.results {
            self.set_backend_results(backend, results);
        }
        for call in delta.tool_calls {
            self.tool_calls_made.push(call);
        }
        for (node, hit) in delta.cache_hits {
            self.cache_hits.insert(node, hit);
        }
        for (node, ms) in delta.latencies {
            self.latencies.insert(node, ms);
        }
        for record in delta.errors {
            self.errors.push(record);
        }
        for name in delta.node_path {
            self.node_path.push(name);
        }
        for message in delta.messages {
            self.messages.push(message);
        }
    }
}

/// Mutations produced by one parallel branch, applied atomically via
/// [`OrchestratorState::merge_delta`].
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub results: Option<(SearchBackend, Value)>,
    pub tool_calls: Vec<String>,
    pub cache_hits: Vec<(String, bool)>,
    pub latencies: Vec<(String, u64)>,
    pub errors: Vec<ErrorRecord>,
    pub node_path: Vec<String>,
    pub messages: Vec<String>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }
}
