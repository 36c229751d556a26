use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Account, Tier, TrialWindow};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("invalid account: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Create-or-update request for an account.
#[derive(Debug, Clone)]
pub struct UpsertAccountRequest {
    pub user_id: String,
    pub email: Option<String>,
    /// Plaintext key; hashed before it is stored. `None` keeps the existing key.
    pub api_key: Option<String>,
    pub tier: Tier,
    pub on_trial: bool,
    pub trial_window: Option<TrialWindow>,
}

impl UpsertAccountRequest {
    pub fn new(user_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            api_key: None,
            tier,
            on_trial: false,
            trial_window: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_trial(mut self, window: TrialWindow) -> Self {
        self.on_trial = true;
        self.trial_window = Some(window);
        self
    }
}

/// Persistent account storage.
pub trait AccountStore: Send + Sync {
    fn upsert(&self, request: UpsertAccountRequest) -> Result<Account, AccountError>;

    fn get(&self, user_id: &str) -> Result<Option<Account>, AccountError>;

    fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Account>, AccountError>;

    /// Clear the trial flag of every account whose window ended at or before
    /// `now`. Trial-tier accounts drop back to free. Returns the number updated.
    fn expire_trials(&self, now: DateTime<Utc>) -> Result<usize, AccountError>;
}
