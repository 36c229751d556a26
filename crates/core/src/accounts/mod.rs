//! Registered accounts and their entitlements.
//!
//! Accounts carry a subscription tier and an optional trial window. The
//! [`Entitlement`] derived from an account decides Pro backend access and
//! whether daily quotas apply.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteAccountStore;
pub use store::{AccountError, AccountStore, UpsertAccountRequest};
pub use types::{Account, Entitlement, Tier, TrialWindow};

use sha2::{Digest, Sha256};

/// Hash an API key the way it is stored. Plaintext keys are never persisted.
pub fn hash_api_key(api_key: &str) -> String {
    format!("{:x}", Sha256::digest(api_key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let a = hash_api_key("secret");
        assert_eq!(a, hash_api_key("secret"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_api_key("Secret"));
    }
}
