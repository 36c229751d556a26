//! SQLite-backed quota ledger.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::ledger::QuotaLedger;
use super::types::{QuotaConfig, QuotaError, Reservation, UsageSnapshot};
use crate::accounts::Entitlement;
use crate::auth::Identity;
use crate::db;

/// One counter row per identity scope.
///
/// A row whose `day` is older than today is treated as zero and overwritten
/// by the next reservation, inside the same transaction.
pub struct SqliteQuotaLedger {
    conn: Mutex<Connection>,
    config: QuotaConfig,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    committed: u32,
    reserved: u32,
}

impl Counter {
    fn used(&self) -> u32 {
        self.committed + self.reserved
    }
}

impl SqliteQuotaLedger {
    pub fn new(path: &Path, config: QuotaConfig) -> Result<Self, QuotaError> {
        let conn = db::open(path).map_err(|e| QuotaError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory(config: QuotaConfig) -> Result<Self, QuotaError> {
        let conn =
            Connection::open_in_memory().map_err(|e| QuotaError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QuotaError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS usage_counters (
                scope TEXT PRIMARY KEY,
                day TEXT NOT NULL,
                committed INTEGER NOT NULL DEFAULT 0,
                reserved INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| QuotaError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QuotaError> {
        self.conn
            .lock()
            .map_err(|_| QuotaError::Database("quota ledger lock poisoned".to_string()))
    }

    /// Daily limit for an identity, `None` when unlimited.
    pub fn daily_limit(
        &self,
        identity: &Identity,
        entitlement: &Entitlement,
        now: DateTime<Utc>,
    ) -> Option<u32> {
        if entitlement.has_pro_access(now) {
            None
        } else if identity.is_registered() {
            self.config.registered_daily_limit
        } else {
            Some(self.config.anonymous_daily_limit)
        }
    }

    /// Today's counter for a scope; rows from earlier days read as zero.
    fn read_counter(
        conn: &Connection,
        scope: &str,
        today: NaiveDate,
    ) -> Result<Counter, QuotaError> {
        let row: Option<(String, u32, u32)> = conn
            .query_row(
                "SELECT day, committed, reserved FROM usage_counters WHERE scope = ?",
                params![scope],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| QuotaError::Database(e.to_string()))?;

        Ok(match row {
            Some((day, committed, reserved)) if db::from_sql_date(&day) == Some(today) => {
                Counter {
                    committed,
                    reserved,
                }
            }
            _ => Counter::default(),
        })
    }

    fn settle(&self, reservation: &Reservation, commit: bool) -> Result<(), QuotaError> {
        let conn = self.conn()?;
        let sql = if commit {
            "UPDATE usage_counters SET committed = committed + 1, reserved = MAX(reserved - 1, 0), updated_at = ? WHERE scope = ? AND day = ?"
        } else {
            "UPDATE usage_counters SET reserved = MAX(reserved - 1, 0), updated_at = ? WHERE scope = ? AND day = ?"
        };

        let updated = conn
            .execute(
                sql,
                params![
                    db::to_sql_timestamp(&Utc::now()),
                    reservation.scope,
                    db::to_sql_date(&reservation.day)
                ],
            )
            .map_err(|e| QuotaError::Database(e.to_string()))?;

        if updated == 0 {
            // The day rolled over since the reservation; nothing left to settle.
            debug!(scope = %reservation.scope, "Reservation outlived its day");
        }
        Ok(())
    }
}

impl QuotaLedger for SqliteQuotaLedger {
    fn check_and_reserve_many(
        &self,
        identity: &Identity,
        entitlement: &Entitlement,
        slots: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, QuotaError> {
        let scope = identity.scope();
        let today = now.date_naive();
        let limit = self.daily_limit(identity, entitlement, now);

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| QuotaError::Database(e.to_string()))?;

        let counter = Self::read_counter(&tx, &scope, today)?;
        let current = counter.used();

        let remaining = match limit {
            Some(limit) if current.saturating_add(slots) > limit => {
                return Err(QuotaError::Exceeded { limit, current });
            }
            Some(limit) => Some(limit - current - slots),
            None => None,
        };

        tx.execute(
            r#"
            INSERT INTO usage_counters (scope, day, committed, reserved, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(scope) DO UPDATE SET
                day = excluded.day,
                committed = excluded.committed,
                reserved = excluded.reserved,
                updated_at = excluded.updated_at
            "#,
            params![
                scope,
                db::to_sql_date(&today),
                counter.committed,
                counter.reserved + slots,
                db::to_sql_timestamp(&now),
            ],
        )
        .map_err(|e| QuotaError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| QuotaError::Database(e.to_string()))?;

        Ok((0..slots)
            .map(|_| Reservation {
                scope: scope.clone(),
                day: today,
                remaining,
            })
            .collect())
    }

    fn commit(&self, reservation: Reservation) -> Result<(), QuotaError> {
        self.settle(&reservation, true)
    }

    fn release(&self, reservation: Reservation) -> Result<(), QuotaError> {
        self.settle(&reservation, false)
    }

    fn clear_reservations(&self) -> Result<usize, QuotaError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE usage_counters SET reserved = 0, updated_at = ? WHERE reserved > 0",
            params![db::to_sql_timestamp(&Utc::now())],
        )
        .map_err(|e| QuotaError::Database(e.to_string()))
    }

    fn usage(
        &self,
        identity: &Identity,
        entitlement: &Entitlement,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError> {
        let conn = self.conn()?;
        let used_today = Self::read_counter(&conn, &identity.scope(), now.date_naive())?.used();
        let limit = self.daily_limit(identity, entitlement, now);

        Ok(UsageSnapshot {
            used_today,
            limit,
            remaining: limit.map(|l| l.saturating_sub(used_today)),
        })
    }
}
