//! SQLite-backed batch store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::store::{BatchError, BatchStore};
use super::types::{Batch, BatchOutcome};
use crate::auth::{Identity, IdentityKind};
use crate::db;

const SELECT_COLUMNS: &str = "id, owner_kind, owner_key, total_jobs, succeeded_count, failed_count, created_at, completed_at";

pub struct SqliteBatchStore {
    conn: Mutex<Connection>,
}

impl SqliteBatchStore {
    pub fn new(path: &Path) -> Result<Self, BatchError> {
        let conn = db::open(path).map_err(|e| BatchError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, BatchError> {
        let conn =
            Connection::open_in_memory().map_err(|e| BatchError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), BatchError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                owner_kind TEXT NOT NULL,
                owner_key TEXT NOT NULL,
                total_jobs INTEGER NOT NULL,
                succeeded_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                CHECK (succeeded_count + failed_count <= total_jobs)
            );

            CREATE INDEX IF NOT EXISTS idx_batches_completed_at ON batches(completed_at);
            "#,
        )
        .map_err(|e| BatchError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BatchError> {
        self.conn
            .lock()
            .map_err(|_| BatchError::Database("batch store lock poisoned".to_string()))
    }

    fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<Batch> {
        let kind: String = row.get(1)?;
        let created_at: String = row.get(6)?;
        let completed_at: Option<String> = row.get(7)?;

        Ok(Batch {
            id: row.get(0)?,
            owner: Identity {
                kind: IdentityKind::parse(&kind).unwrap_or(IdentityKind::Anonymous),
                key: row.get(2)?,
            },
            total_jobs: row.get(3)?,
            succeeded_count: row.get(4)?,
            failed_count: row.get(5)?,
            created_at: db::from_sql_timestamp(&created_at),
            completed_at: completed_at.as_deref().map(db::from_sql_timestamp),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Batch>, BatchError> {
        let sql = format!("SELECT {} FROM batches WHERE id = ?", SELECT_COLUMNS);
        conn.query_row(&sql, params![id], Self::row_to_batch)
            .optional()
            .map_err(|e| BatchError::Database(e.to_string()))
    }
}

impl BatchStore for SqliteBatchStore {
    fn create(&self, owner: &Identity, total_jobs: u32) -> Result<Batch, BatchError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO batches (id, owner_kind, owner_key, total_jobs, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                id,
                owner.kind.as_str(),
                owner.key,
                total_jobs,
                db::to_sql_timestamp(&now)
            ],
        )
        .map_err(|e| BatchError::Database(e.to_string()))?;

        Ok(Batch {
            id,
            owner: owner.clone(),
            total_jobs,
            succeeded_count: 0,
            failed_count: 0,
            created_at: now,
            completed_at: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Batch>, BatchError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn record_outcome(
        &self,
        id: &str,
        outcome: BatchOutcome,
        now: DateTime<Utc>,
    ) -> Result<Batch, BatchError> {
        let conn = self.conn()?;
        let (succeeded, failed) = match outcome {
            BatchOutcome::Succeeded => (1, 0),
            BatchOutcome::Failed => (0, 1),
        };

        // SET expressions see the pre-update row, hence the `+ 1`.
        let updated = conn
            .execute(
                r#"
                UPDATE batches
                SET succeeded_count = succeeded_count + ?1,
                    failed_count = failed_count + ?2,
                    completed_at = CASE
                        WHEN succeeded_count + failed_count + 1 >= total_jobs THEN ?3
                        ELSE completed_at
                    END
                WHERE id = ?4 AND succeeded_count + failed_count < total_jobs
                "#,
                params![succeeded, failed, db::to_sql_timestamp(&now), id],
            )
            .map_err(|e| BatchError::Database(e.to_string()))?;

        let batch = Self::fetch(&conn, id)?.ok_or_else(|| BatchError::NotFound(id.to_string()))?;
        if updated == 0 {
            warn!(batch_id = %id, "Outcome recorded for an already complete batch");
        }
        Ok(batch)
    }

    fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, BatchError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "DELETE FROM batches WHERE completed_at IS NOT NULL AND completed_at < ? RETURNING id",
            )
            .map_err(|e| BatchError::Database(e.to_string()))?;
        let ids = stmt
            .query_map(params![db::to_sql_timestamp(&cutoff)], |row| row.get(0))
            .map_err(|e| BatchError::Database(e.to_string()))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| BatchError::Database(e.to_string()))?;
        Ok(ids)
    }
}
