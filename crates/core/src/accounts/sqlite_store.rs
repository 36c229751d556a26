//! SQLite-backed account store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::hash_api_key;
use super::store::{AccountError, AccountStore, UpsertAccountRequest};
use super::types::{Account, Tier, TrialWindow};
use crate::db;

const SELECT_COLUMNS: &str = "user_id, email, api_key_hash, tier, on_trial, trial_start, trial_end, created_at, updated_at";

/// SQLite-backed account store.
pub struct SqliteAccountStore {
    conn: Mutex<Connection>,
}

impl SqliteAccountStore {
    /// Open (or create) the account tables in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, AccountError> {
        let conn = db::open(path).map_err(|e| AccountError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, AccountError> {
        let conn =
            Connection::open_in_memory().map_err(|e| AccountError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), AccountError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                email TEXT,
                api_key_hash TEXT UNIQUE,
                tier TEXT NOT NULL DEFAULT 'free',
                on_trial INTEGER NOT NULL DEFAULT 0,
                trial_start TEXT,
                trial_end TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_trial_end ON accounts(trial_end);
            "#,
        )
        .map_err(|e| AccountError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AccountError> {
        self.conn
            .lock()
            .map_err(|_| AccountError::Database("account store lock poisoned".to_string()))
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        let tier_str: String = row.get(3)?;
        let trial_start: Option<String> = row.get(5)?;
        let trial_end: Option<String> = row.get(6)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        let trial_window = match (trial_start, trial_end) {
            (Some(start), Some(end)) => Some(TrialWindow {
                start: db::from_sql_timestamp(&start),
                end: db::from_sql_timestamp(&end),
            }),
            _ => None,
        };

        Ok(Account {
            user_id: row.get(0)?,
            email: row.get(1)?,
            api_key_hash: row.get(2)?,
            tier: tier_str.parse().unwrap_or(Tier::Free),
            on_trial: row.get::<_, i64>(4)? != 0,
            trial_window,
            created_at: db::from_sql_timestamp(&created_at),
            updated_at: db::from_sql_timestamp(&updated_at),
        })
    }

    fn query_one(
        conn: &Connection,
        column: &str,
        value: &str,
    ) -> Result<Option<Account>, AccountError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE {} = ?",
            SELECT_COLUMNS, column
        );
        conn.query_row(&sql, params![value], Self::row_to_account)
            .optional()
            .map_err(|e| AccountError::Database(e.to_string()))
    }
}

impl AccountStore for SqliteAccountStore {
    fn upsert(&self, request: UpsertAccountRequest) -> Result<Account, AccountError> {
        if request.user_id.trim().is_empty() {
            return Err(AccountError::Invalid("user_id must not be empty".to_string()));
        }
        if let Some(window) = request.trial_window {
            if window.end <= window.start {
                return Err(AccountError::Invalid(format!(
                    "trial window for '{}' ends before it starts",
                    request.user_id
                )));
            }
        }

        let conn = self.conn()?;
        let now = db::to_sql_timestamp(&Utc::now());
        let key_hash = request.api_key.as_deref().map(hash_api_key);

        conn.execute(
            r#"
            INSERT INTO accounts (user_id, email, api_key_hash, tier, on_trial, trial_start, trial_end, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(user_id) DO UPDATE SET
                email = COALESCE(excluded.email, accounts.email),
                api_key_hash = COALESCE(excluded.api_key_hash, accounts.api_key_hash),
                tier = excluded.tier,
                on_trial = excluded.on_trial,
                trial_start = excluded.trial_start,
                trial_end = excluded.trial_end,
                updated_at = excluded.updated_at
            "#,
            params![
                request.user_id,
                request.email,
                key_hash,
                request.tier.as_str(),
                request.on_trial as i64,
                request.trial_window.map(|w| db::to_sql_timestamp(&w.start)),
                request.trial_window.map(|w| db::to_sql_timestamp(&w.end)),
                now,
            ],
        )
        .map_err(|e| AccountError::Database(e.to_string()))?;

        Self::query_one(&conn, "user_id", &request.user_id)?
            .ok_or(AccountError::NotFound(request.user_id))
    }

    fn get(&self, user_id: &str) -> Result<Option<Account>, AccountError> {
        let conn = self.conn()?;
        Self::query_one(&conn, "user_id", user_id)
    }

    fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Account>, AccountError> {
        let conn = self.conn()?;
        Self::query_one(&conn, "api_key_hash", key_hash)
    }

    fn expire_trials(&self, now: DateTime<Utc>) -> Result<usize, AccountError> {
        let conn = self.conn()?;
        let now = db::to_sql_timestamp(&now);

        conn.execute(
            r#"
            UPDATE accounts
            SET on_trial = 0,
                tier = CASE WHEN tier = 'trial' THEN 'free' ELSE tier END,
                updated_at = ?1
            WHERE on_trial = 1 AND trial_end IS NOT NULL AND trial_end <= ?1
            "#,
            params![now],
        )
        .map_err(|e| AccountError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn create_test_store() -> SqliteAccountStore {
        SqliteAccountStore::in_memory().unwrap()
    }

    fn window(start: DateTime<Utc>, days: i64) -> TrialWindow {
        TrialWindow {
            start,
            end: start + Duration::days(days),
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let store = create_test_store();
        let account = store
            .upsert(
                UpsertAccountRequest::new("alice", Tier::Pro)
                    .with_email("alice@example.com")
                    .with_api_key("key-alice"),
            )
            .unwrap();

        assert_eq!(account.user_id, "alice");
        assert_eq!(account.tier, Tier::Pro);
        assert_eq!(account.api_key_hash.as_deref(), Some(hash_api_key("key-alice").as_str()));

        let fetched = store.get("alice").unwrap().unwrap();
        assert_eq!(fetched, account);
    }

    #[test]
    fn test_get_missing() {
        let store = create_test_store();
        assert!(store.get("nobody").unwrap().is_none());
    }

    #[test]
    fn test_find_by_api_key_hash() {
        let store = create_test_store();
        store
            .upsert(UpsertAccountRequest::new("bob", Tier::Free).with_api_key("key-bob"))
            .unwrap();

        let found = store
            .find_by_api_key_hash(&hash_api_key("key-bob"))
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, "bob");

        assert!(store
            .find_by_api_key_hash(&hash_api_key("key-other"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_upsert_keeps_existing_key_and_email() {
        let store = create_test_store();
        store
            .upsert(
                UpsertAccountRequest::new("carol", Tier::Free)
                    .with_email("carol@example.com")
                    .with_api_key("key-carol"),
            )
            .unwrap();

        let updated = store
            .upsert(UpsertAccountRequest::new("carol", Tier::Enterprise))
            .unwrap();

        assert_eq!(updated.tier, Tier::Enterprise);
        assert_eq!(updated.email.as_deref(), Some("carol@example.com"));
        assert!(updated.api_key_hash.is_some());
    }

    #[test]
    fn test_upsert_rejects_inverted_trial() {
        let store = create_test_store();
        let start = Utc::now();
        let mut request = UpsertAccountRequest::new("dave", Tier::Trial).with_trial(window(start, 1));
        request.trial_window = Some(TrialWindow {
            start,
            end: start - Duration::hours(1),
        });

        assert!(matches!(store.upsert(request), Err(AccountError::Invalid(_))));
    }

    #[test]
    fn test_expire_trials() {
        let store = create_test_store();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        store
            .upsert(UpsertAccountRequest::new("ended", Tier::Trial).with_trial(window(start, 7)))
            .unwrap();
        store
            .upsert(UpsertAccountRequest::new("running", Tier::Trial).with_trial(window(start, 30)))
            .unwrap();
        store
            .upsert(UpsertAccountRequest::new("paid", Tier::Pro).with_trial(window(start, 7)))
            .unwrap();

        let now = start + Duration::days(7);
        let expired = store.expire_trials(now).unwrap();
        assert_eq!(expired, 2);

        let ended = store.get("ended").unwrap().unwrap();
        assert!(!ended.on_trial);
        assert_eq!(ended.tier, Tier::Free);

        let paid = store.get("paid").unwrap().unwrap();
        assert!(!paid.on_trial);
        assert_eq!(paid.tier, Tier::Pro);

        let running = store.get("running").unwrap().unwrap();
        assert!(running.on_trial);
        assert!(running.entitlement().has_pro_access(now));

        // second sweep is a no-op
        assert_eq!(store.expire_trials(now).unwrap(), 0);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("mdraft.db");

        let store = SqliteAccountStore::new(&db_path).unwrap();
        store
            .upsert(UpsertAccountRequest::new("erin", Tier::Free))
            .unwrap();

        assert!(db_path.exists());
        assert!(store.get("erin").unwrap().is_some());
    }
}
