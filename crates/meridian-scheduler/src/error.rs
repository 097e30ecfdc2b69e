//! Error types for the query scheduler.

use thiserror::Error;

/// Scheduler-level failures.
///
/// Individual node failures never surface here: they are classified and
/// recorded through the recovery manager, and the query proceeds with
/// whatever branches succeeded. These errors cover the session itself.
#[derive(Debug, Error)]
pub enum Error {
    /// The query was empty or otherwise unusable before any call was made.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The initial checkpoint could not be created; without it the session
    /// would be unresumable, so the query does not start.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] meridian_checkpoint::Error),

    /// A resume was requested for an unknown checkpoint id.
    #[error("Checkpoint not found: {0}")]
    UnknownCheckpoint(String),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;
