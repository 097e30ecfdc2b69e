//! Backend-call outcomes and the error vocabulary shared across the core.

use serde::{Deserialize, Serialize};

/// The search backends a query can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchBackend {
    /// Published-literature search (e.g., PubMed-style indices).
    Literature,
    /// Clinical-trial registry search.
    Trials,
    /// Internal semantic search over ingested documents.
    Semantic,
}

impl SearchBackend {
    /// Node name used in `tool_calls_made`, `node_path`, and latency maps.
    pub fn node_name(&self) -> &'static str {
        match self {
            SearchBackend::Literature => "literature-search",
            SearchBackend::Trials => "trials-search",
            SearchBackend::Semantic => "semantic-search",
        }
    }
}

/// Closed error classification, populated by each backend adapter at the
/// source of the error.
///
/// Adapters that can only report free text may use [`ErrorKind::classify`]
/// as a fallback, but setting the kind directly is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The backend rejected the call due to rate limiting (429-style).
    RateLimited,
    /// Network or server trouble (connection reset, 5xx) likely to clear.
    Transient,
    /// The call exceeded its deadline.
    Timeout,
    /// Validation or unsupported-operation failure; retrying cannot help.
    Permanent,
}

impl ErrorKind {
    /// Whether a retry has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }

    /// Fallback classification from a free-text error message.
    ///
    /// Unknown messages classify as [`ErrorKind::Transient`] so they get at
    /// least one retry before the node is abandoned.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("rate limit")
            || msg.contains("too many requests")
            || msg.contains("429")
        {
            ErrorKind::RateLimited
        } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline")
        {
            ErrorKind::Timeout
        } else if msg.contains("validation")
            || msg.contains("invalid")
            || msg.contains("unsupported")
            || msg.contains("not found")
            || msg.contains("unauthorized")
        {
            ErrorKind::Permanent
        } else {
            ErrorKind::Transient
        }
    }
}

/// A classified backend failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl NodeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from free text alone, classifying via [`ErrorKind::classify`].
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::classify(&message),
            message,
        }
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of one backend call. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub success: bool,
    pub node_name: String,
    pub latency_ms: u64,
    pub error: Option<NodeError>,
}

impl NodeResult {
    /// A successful call.
    pub fn ok(node_name: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: true,
            node_name: node_name.into(),
            latency_ms,
            error: None,
        }
    }

    /// A failed call with a classified error.
    pub fn failed(node_name: impl Into<String>, latency_ms: u64, error: NodeError) -> Self {
        Self {
            success: false,
            node_name: node_name.into(),
            latency_ms,
            error: Some(error),
        }
    }

    /// The error message, or an empty string for successful results.
    pub fn error_message(&self) -> &str {
        self.error.as_ref().map(|e| e.message.as_str()).unwrap_or("")
    }
}

/// The action a recovery decision commits to.
///
/// Stored on every [`crate::ErrorRecord`] and echoed into `node_path` as a
/// `recovery_*` marker, so both live here alongside the state model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    RetryWithBackoff,
    RetryImmediately,
    SkipNode,
    FailPermanently,
}

impl RecoveryAction {
    /// Audit-trail marker appended to `node_path` when the action is applied.
    pub fn marker(&self) -> &'static str {
        match self {
            RecoveryAction::RetryWithBackoff => "recovery_retry_with_backoff",
            RecoveryAction::RetryImmediately => "recovery_retry_immediately",
            RecoveryAction::SkipNode => "recovery_skip_node",
            RecoveryAction::FailPermanently => "recovery_fail_permanently",
        }
    }
}
