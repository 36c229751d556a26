use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// Request information for identity resolution
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// Look up a header by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Which kind of caller an identity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Registered account, authenticated by API key.
    User,
    /// Returning browser or client presenting a session token.
    Session,
    /// First contact without any token; a fresh session key is minted.
    Anonymous,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::User => "user",
            IdentityKind::Session => "session",
            IdentityKind::Anonymous => "anonymous",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(IdentityKind::User),
            "session" => Some(IdentityKind::Session),
            "anonymous" => Some(IdentityKind::Anonymous),
            _ => None,
        }
    }
}

/// The caller's quota and entitlement scope.
///
/// Every request resolves to exactly one of these; downstream code never looks
/// at raw credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub kind: IdentityKind,
    pub key: String,
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::User,
            key: user_id.into(),
        }
    }

    pub fn session(token: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Session,
            key: token.into(),
        }
    }

    pub fn anonymous(key: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Anonymous,
            key: key.into(),
        }
    }

    /// Anonymous identity with a newly minted session key.
    pub fn mint_anonymous() -> Self {
        Self::anonymous(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_registered(&self) -> bool {
        self.kind == IdentityKind::User
    }

    /// Key used for usage counters and ownership checks.
    ///
    /// Anonymous and session identities with the same key share a scope: the
    /// anonymous key is handed back to the client as its session token.
    pub fn scope(&self) -> String {
        match self.kind {
            IdentityKind::User => format!("user:{}", self.key),
            IdentityKind::Session | IdentityKind::Anonymous => format!("session:{}", self.key),
        }
    }

    /// Whether `self` may see resources created by `owner`.
    pub fn owns(&self, owner: &Identity) -> bool {
        self.scope() == owner.scope()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Session keys are bearer tokens; only log a prefix.
        let shown: String = match self.kind {
            IdentityKind::User => self.key.clone(),
            _ => self.key.chars().take(8).collect(),
        };
        write!(f, "{}:{}", self.kind.as_str(), shown)
    }
}
