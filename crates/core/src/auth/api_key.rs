//! API key resolution for registered accounts.

use std::sync::Arc;

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Identity, IdentityResolver};
use crate::accounts::{hash_api_key, AccountStore};

/// Resolves registered users from an API key.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
///
/// Keys are hashed before lookup, so stored hashes never meet plaintext.
pub struct ApiKeyResolver {
    accounts: Arc<dyn AccountStore>,
}

impl ApiKeyResolver {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    fn extract_key(request: &AuthRequest) -> Option<&str> {
        if let Some(auth_header) = request.header("authorization") {
            let key = auth_header
                .strip_prefix("Bearer ")
                .or_else(|| auth_header.strip_prefix("bearer "));
            if let Some(key) = key {
                return Some(key.trim());
            }
        }

        request.header("x-api-key").map(str::trim)
    }
}

#[async_trait]
impl IdentityResolver for ApiKeyResolver {
    async fn resolve(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let key = Self::extract_key(request).ok_or(AuthError::NotAuthenticated)?;
        if key.is_empty() {
            return Err(AuthError::InvalidCredentials("Empty API key".to_string()));
        }

        let account = self
            .accounts
            .find_by_api_key_hash(&hash_api_key(key))
            .map_err(|e| AuthError::ServiceUnavailable(e.to_string()))?
            .ok_or_else(|| AuthError::InvalidCredentials("Invalid API key".to_string()))?;

        Ok(Identity::user(account.user_id))
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}
