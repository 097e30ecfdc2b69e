//! Progress event payloads consumed by the transport layer.
//!
//! The core emits these; how they reach clients (SSE, websocket) is not this
//! crate's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    NodeStarted,
    NodeCompleted,
    SourceFailed,
    SynthesisStarted,
    SynthesisCompleted,
    OrchestrationFailed,
}

/// One progress event. `data` carries kind-specific payload built from the
/// current node path, errors, and budget summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: ProgressKind,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(event: ProgressKind, data: Value) -> Self {
        Self {
            event,
            data,
            timestamp: Utc::now(),
        }
    }
}
