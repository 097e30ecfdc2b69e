//! Durable checkpoints and per-query metrics for the Meridian orchestrator.
//!
//! A checkpoint is a resumable snapshot of one query's orchestrator state
//! plus completion metadata. It is created once per query, upserted after
//! every state transition, and finalized exactly once; finalization also
//! appends one analytics row that is never read back into orchestration.
//!
//! Storage is pluggable through [`CheckpointRepository`]:
//! [`MemoryRepository`] for tests, [`SqliteRepository`] for production.

mod error;
mod manager;
mod repository;
mod sqlite;
mod types;

pub use error::{Error, Result};
pub use manager::{CheckpointManager, FinalizeGuard};
pub use repository::{CheckpointRepository, MemoryRepository};
pub use sqlite::SqliteRepository;
pub use types::{Checkpoint, QueryMetricsRow};
