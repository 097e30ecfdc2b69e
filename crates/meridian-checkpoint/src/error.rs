//! Error types for checkpoint operations.

use thiserror::Error;

/// Error type for checkpoint persistence and lookup.
#[derive(Debug, Error)]
pub enum Error {
    /// No checkpoint exists under the given id.
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// The checkpoint was already finalized; it is read-only now.
    #[error("Checkpoint already finalized: {0}")]
    AlreadyFinalized(String),

    /// Underlying SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// State snapshot could not be (de)serialized.
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp could not be parsed.
    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, Error>;
