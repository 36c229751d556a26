use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daily limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaConfig {
    /// Conversions per UTC day for anonymous and session identities.
    #[serde(default = "default_anonymous_daily_limit")]
    pub anonymous_daily_limit: u32,
    /// Conversions per UTC day for registered users without Pro access.
    /// Unset means unlimited.
    #[serde(default)]
    pub registered_daily_limit: Option<u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            anonymous_daily_limit: default_anonymous_daily_limit(),
            registered_daily_limit: None,
        }
    }
}

fn default_anonymous_daily_limit() -> u32 {
    5
}

/// One reserved conversion slot.
///
/// Must be handed back through `commit` once the job exists, or `release`
/// if it could not be created.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    pub scope: String,
    /// UTC day the slot counts against.
    pub day: NaiveDate,
    /// Allowance left after this reservation; `None` means unlimited.
    pub remaining: Option<u32>,
}

/// Read-only view of an identity's usage for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub used_today: u32,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("daily conversion limit reached ({current}/{limit})")]
    Exceeded { limit: u32, current: u32 },

    #[error("quota store error: {0}")]
    Database(String),
}
