//! Error recovery for the Meridian orchestrator.
//!
//! A failed backend call is classified and turned into a [`RecoveryStrategy`]
//! (retry with backoff, skip, or fail), then applied to the orchestrator
//! state as exactly one error record plus one audit-trail marker. The manager
//! only computes decisions; sleeping out a backoff delay is the scheduler's
//! job, and node failures never propagate as errors to the caller.

mod manager;
mod strategy;

pub use manager::{RecoveryConfig, RecoveryManager};
pub use strategy::RecoveryStrategy;
