//! Shared types for the Meridian research orchestrator.
//!
//! One biomedical question fans out to several independent search backends
//! (literature, clinical trials, internal semantic search). This crate holds
//! the state record threaded through that fan-out, the per-call outcome
//! types, and the progress event payloads the transport layer serializes.
//!
//! The resilience logic itself lives in the sibling crates:
//! `meridian-budget`, `meridian-recovery`, and `meridian-checkpoint`.

mod node;
mod progress;
mod state;

pub use node::{ErrorKind, NodeError, NodeResult, RecoveryAction, SearchBackend};
pub use progress::{ProgressEvent, ProgressKind};
pub use state::{ErrorRecord, OrchestratorState, QueryFrame, RoutingDecision, StateDelta};
