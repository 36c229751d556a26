use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Authentication service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Turns request credentials into a single tagged [`Identity`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the identity behind a request.
    ///
    /// Returns `NotAuthenticated` when the request carries no credentials this
    /// resolver understands, so resolvers can be chained.
    async fn resolve(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Name of this resolution method
    fn method_name(&self) -> &'static str;
}
