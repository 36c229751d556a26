//! Per-identity daily conversion quotas.

mod ledger;
mod sqlite_ledger;
mod types;

pub use ledger::QuotaLedger;
pub use sqlite_ledger::SqliteQuotaLedger;
pub use types::{QuotaConfig, QuotaError, Reservation, UsageSnapshot};
