//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{CreateJobRequest, JobError, JobFilter, JobStore};
use super::types::{ConversionJob, JobState, JobTransition};
use crate::auth::{Identity, IdentityKind};
use crate::db;

const SELECT_COLUMNS: &str = "id, identity_kind, identity_key, backend, output_format, filename, file_size_bytes, file_extension, state, batch_id, input_ref, created_at, updated_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = db::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                identity_kind TEXT NOT NULL,
                identity_key TEXT NOT NULL,
                owner_scope TEXT NOT NULL,
                backend TEXT NOT NULL,
                output_format TEXT NOT NULL,
                filename TEXT NOT NULL,
                file_size_bytes INTEGER NOT NULL,
                file_extension TEXT NOT NULL,
                state TEXT NOT NULL,
                batch_id TEXT,
                input_ref TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_owner_scope ON jobs(owner_scope);
            CREATE INDEX IF NOT EXISTS idx_jobs_batch_id ON jobs(batch_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs(updated_at);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Database("job store lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.states.is_empty() {
            let placeholders = vec!["?"; filter.states.len()].join(", ");
            conditions.push(format!("json_extract(state, '$.type') IN ({})", placeholders));
            for state in &filter.states {
                params.push(Box::new(state.clone()));
            }
        }

        if let Some(ref scope) = filter.owner_scope {
            conditions.push("owner_scope = ?".to_string());
            params.push(Box::new(scope.clone()));
        }

        if let Some(ref batch_id) = filter.batch_id {
            conditions.push("batch_id = ?".to_string());
            params.push(Box::new(batch_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ConversionJob> {
        let kind: String = row.get(1)?;
        let backend: String = row.get(3)?;
        let output_format: String = row.get(4)?;
        let state_json: String = row.get(8)?;
        let created_at: String = row.get(11)?;
        let updated_at: String = row.get(12)?;

        let kind = IdentityKind::parse(&kind).unwrap_or(IdentityKind::Anonymous);
        let state: JobState = serde_json::from_str(&state_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(ConversionJob {
            id: row.get(0)?,
            identity: Identity {
                kind,
                key: row.get(2)?,
            },
            backend: backend.parse().unwrap_or_default(),
            output_format: output_format.parse().unwrap_or_default(),
            filename: row.get(5)?,
            file_size_bytes: row.get::<_, i64>(6)? as u64,
            file_extension: row.get(7)?,
            state,
            batch_id: row.get(9)?,
            input_ref: row.get(10)?,
            created_at: db::from_sql_timestamp(&created_at),
            updated_at: db::from_sql_timestamp(&updated_at),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<ConversionJob>, JobError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", SELECT_COLUMNS);
        conn.query_row(&sql, params![id], Self::row_to_job)
            .optional()
            .map_err(|e| JobError::Database(e.to_string()))
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, request: CreateJobRequest) -> Result<ConversionJob, JobError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let state = JobState::Created;
        let state_json =
            serde_json::to_string(&state).map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO jobs (id, identity_kind, identity_key, owner_scope, backend, output_format,
                              filename, file_size_bytes, file_extension, state, batch_id, input_ref,
                              created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
            params![
                id,
                request.identity.kind.as_str(),
                request.identity.key,
                request.identity.scope(),
                request.backend.as_str(),
                request.output_format.as_str(),
                request.filename,
                request.file_size_bytes as i64,
                request.file_extension,
                state_json,
                request.batch_id,
                request.input_ref,
                db::to_sql_timestamp(&now),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(ConversionJob {
            id,
            identity: request.identity,
            backend: request.backend,
            output_format: request.output_format,
            filename: request.filename,
            file_size_bytes: request.file_size_bytes,
            file_extension: request.file_extension,
            state,
            batch_id: request.batch_id,
            input_ref: request.input_ref,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<ConversionJob>, JobError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<ConversionJob>, JobError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| JobError::Database(e.to_string()))
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| JobError::Database(e.to_string()))
    }

    fn transition(&self, id: &str, transition: JobTransition) -> Result<ConversionJob, JobError> {
        let conn = self.conn()?;

        let current = Self::fetch(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        let new_state =
            current
                .state
                .apply(&transition)
                .ok_or_else(|| JobError::InvalidTransition {
                    job_id: id.to_string(),
                    current_state: current.state.state_type().to_string(),
                    transition: transition.name().to_string(),
                })?;

        let now = Utc::now();
        let state_json =
            serde_json::to_string(&new_state).map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE jobs SET state = ?, updated_at = ? WHERE id = ?",
            params![state_json, db::to_sql_timestamp(&now), id],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(ConversionJob {
            state: new_state,
            updated_at: now,
            ..current
        })
    }

    fn clear_input_ref(&self, id: &str) -> Result<(), JobError> {
        let conn = self.conn()?;
        conn.execute("UPDATE jobs SET input_ref = NULL WHERE id = ?", params![id])
            .map_err(|e| JobError::Database(e.to_string()))?;
        Ok(())
    }

    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM jobs WHERE json_extract(state, '$.type') IN ('succeeded', 'failed', 'expired') AND batch_id IS NULL AND updated_at < ?",
            params![db::to_sql_timestamp(&cutoff)],
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn purge_batch_members(&self, batch_ids: &[String]) -> Result<usize, JobError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| JobError::Database(e.to_string()))?;
        let mut removed = 0;
        for batch_id in batch_ids {
            removed += tx
                .execute("DELETE FROM jobs WHERE batch_id = ?", params![batch_id])
                .map_err(|e| JobError::Database(e.to_string()))?;
        }
        tx.commit().map_err(|e| JobError::Database(e.to_string()))?;
        Ok(removed)
    }
}
