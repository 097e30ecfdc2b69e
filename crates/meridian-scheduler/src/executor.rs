//! The backend adapter seam.
//!
//! Every literature/trials/semantic-search client implements [`NodeExecutor`].
//! Adapters classify their own failures into the closed
//! [`meridian_types::ErrorKind`] vocabulary at the source; the scheduler
//! handles timeouts, budgets, and retries around them.

use async_trait::async_trait;
use meridian_types::{NodeResult, SearchBackend};
use serde_json::Value;

/// One backend call.
#[derive(Debug, Clone)]
pub struct NodeCall {
    pub backend: SearchBackend,
    pub query: String,
    /// Free-form adapter options (result limits, filters).
    pub params: Value,
    /// 1-based attempt number, for adapter-side logging.
    pub attempt: u32,
}

/// What one backend call produced.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub result: NodeResult,
    /// Backend payload on success; stored into the state's result slot.
    pub payload: Option<Value>,
    /// Whether the adapter answered from its cache.
    pub cache_hit: bool,
}

impl NodeOutcome {
    pub fn success(result: NodeResult, payload: Value) -> Self {
        Self {
            result,
            payload: Some(payload),
            cache_hit: false,
        }
    }

    pub fn failure(result: NodeResult) -> Self {
        Self {
            result,
            payload: None,
            cache_hit: false,
        }
    }

    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = hit;
        self
    }
}

/// A backend adapter.
///
/// Implementations perform the actual I/O. They should return a failed
/// [`NodeResult`] rather than panicking; the scheduler never lets a node
/// failure escape as an error.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, call: NodeCall) -> NodeOutcome;
}
