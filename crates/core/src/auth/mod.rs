mod api_key;
mod session;
mod traits;
mod types;

pub use api_key::*;
pub use session::*;
pub use traits::*;
pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;

use crate::accounts::AccountStore;
use crate::config::{AuthConfig, AuthMethod};

/// Tries API keys first and falls back to session resolution.
///
/// Presenting an API key that does not resolve is an error; it never
/// degrades to an anonymous identity.
pub struct ChainResolver {
    api_key: ApiKeyResolver,
    session: SessionResolver,
}

impl ChainResolver {
    pub fn new(api_key: ApiKeyResolver, session: SessionResolver) -> Self {
        Self { api_key, session }
    }
}

#[async_trait]
impl IdentityResolver for ChainResolver {
    async fn resolve(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        match self.api_key.resolve(request).await {
            Err(AuthError::NotAuthenticated) => self.session.resolve(request).await,
            other => other,
        }
    }

    fn method_name(&self) -> &'static str {
        "session"
    }
}

/// Factory function to create the identity resolver from config
pub fn create_resolver(
    config: &AuthConfig,
    accounts: Arc<dyn AccountStore>,
) -> Box<dyn IdentityResolver> {
    let api_key = ApiKeyResolver::new(accounts);
    match config.method {
        AuthMethod::Session => Box::new(ChainResolver::new(api_key, SessionResolver::new())),
        AuthMethod::ApiKey => Box::new(api_key),
    }
}
