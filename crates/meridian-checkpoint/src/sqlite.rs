//! Durable checkpoint repository backed by SQLite.
//!
//! Uses WAL mode for concurrent read performance. State snapshots are stored
//! as a JSON column; the metrics table is append-only.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::Result;
use crate::repository::CheckpointRepository;
use crate::types::{Checkpoint, QueryMetricsRow};

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// SQLite-backed checkpoint store.
///
/// The connection sits behind a mutex; every call is one short statement, so
/// contention is negligible next to the backend calls being checkpointed.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open (or create) the checkpoint database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self::init(conn)?;
        info!(path = %path.display(), "checkpoint store opened");
        Ok(repo)
    }

    /// Open an in-memory database. Useful for tests that want real SQL.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id              TEXT PRIMARY KEY,
                query           TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                completed_at    TEXT,
                error_count     INTEGER NOT NULL DEFAULT 0,
                partial_results INTEGER NOT NULL DEFAULT 0,
                state_snapshot  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS query_metrics (
                rowid            INTEGER PRIMARY KEY AUTOINCREMENT,
                checkpoint_id    TEXT NOT NULL,
                intent           TEXT NOT NULL,
                total_latency_ms INTEGER NOT NULL,
                result_count     INTEGER NOT NULL,
                error_count      INTEGER NOT NULL,
                answered         INTEGER NOT NULL,
                finalized_at     TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of metrics rows. Analytics/test helper.
    pub fn metrics_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM query_metrics", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

impl CheckpointRepository for SqliteRepository {
    fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let snapshot = serde_json::to_string(&checkpoint.state_snapshot)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO checkpoints (id, query, created_at, completed_at,
                                     error_count, partial_results, state_snapshot)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                completed_at    = excluded.completed_at,
                error_count     = excluded.error_count,
                partial_results = excluded.partial_results,
                state_snapshot  = excluded.state_snapshot
            "#,
            params![
                checkpoint.checkpoint_id,
                checkpoint.query,
                checkpoint.created_at.to_rfc3339(),
                checkpoint.completed_at.map(|ts| ts.to_rfc3339()),
                checkpoint.error_count as i64,
                checkpoint.partial_results as i64,
                snapshot,
            ],
        )?;

        debug!(checkpoint_id = %checkpoint.checkpoint_id, "checkpoint upserted");
        Ok(())
    }

    fn get(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                r#"
                SELECT id, query, created_at, completed_at,
                       error_count, partial_results, state_snapshot
                FROM checkpoints WHERE id = ?1
                "#,
                params![checkpoint_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, query, created_at, completed_at, error_count, partial, snapshot)) = row
        else {
            return Ok(None);
        };

        Ok(Some(Checkpoint {
            checkpoint_id: id,
            query,
            created_at: created_at.parse()?,
            completed_at: completed_at
                .map(|ts| ts.parse::<chrono::DateTime<chrono::Utc>>())
                .transpose()?,
            error_count: error_count as usize,
            partial_results: partial != 0,
            state_snapshot: serde_json::from_str(&snapshot)?,
        }))
    }

    fn append_metrics(&self, row: &QueryMetricsRow) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO query_metrics (checkpoint_id, intent, total_latency_ms,
                                       result_count, error_count, answered, finalized_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                row.checkpoint_id,
                row.intent,
                row.total_latency_ms as i64,
                row.result_count as i64,
                row.error_count as i64,
                row.answered as i64,
                row.finalized_at.to_rfc3339(),
            ],
        )?;

        debug!(checkpoint_id = %row.checkpoint_id, "metrics row appended");
        Ok(())
    }
}
