use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subscription tier of a registered account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Trial,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Trial => "trial",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Paid tiers get Pro access and skip daily limits regardless of trials.
    pub fn is_paid(&self) -> bool {
        matches!(self, Tier::Pro | Tier::Enterprise)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "trial" => Ok(Tier::Trial),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// Half-open trial period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TrialWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

/// What an identity is allowed to do right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub tier: Tier,
    pub on_trial: bool,
    pub trial_window: Option<TrialWindow>,
}

impl Entitlement {
    /// Entitlement of anonymous callers and unknown users.
    pub fn free() -> Self {
        Self {
            tier: Tier::Free,
            on_trial: false,
            trial_window: None,
        }
    }

    /// A trial counts only while flagged and inside its window.
    pub fn trial_active(&self, now: DateTime<Utc>) -> bool {
        self.on_trial && self.trial_window.is_some_and(|w| w.contains(now))
    }

    pub fn has_pro_access(&self, now: DateTime<Utc>) -> bool {
        self.tier.is_paid() || self.trial_active(now)
    }

    /// Tier as observed at `now`, with lapsed trials reported as free.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        if self.tier.is_paid() {
            self.tier
        } else if self.trial_active(now) {
            Tier::Trial
        } else {
            Tier::Free
        }
    }
}

impl Default for Entitlement {
    fn default() -> Self {
        Self::free()
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub api_key_hash: Option<String>,
    pub tier: Tier,
    pub on_trial: bool,
    pub trial_window: Option<TrialWindow>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn entitlement(&self) -> Entitlement {
        Entitlement {
            tier: self.tier,
            on_trial: self.on_trial,
            trial_window: self.trial_window,
        }
    }
}
