//! Session-token resolution with anonymous fallback.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Identity, IdentityResolver};

/// Header carrying the session token. Also echoed back when a key is minted.
pub const SESSION_HEADER: &str = "x-session-id";

/// Cookie name accepted as an alternative to [`SESSION_HEADER`].
pub const SESSION_COOKIE: &str = "session_id";

const MAX_TOKEN_LEN: usize = 128;

/// Resolves a session identity from the `X-Session-Id` header or the
/// `session_id` cookie. Requests without either get a freshly minted
/// anonymous identity.
#[derive(Debug, Default)]
pub struct SessionResolver;

impl SessionResolver {
    pub fn new() -> Self {
        Self
    }

    fn extract_token(request: &AuthRequest) -> Option<&str> {
        if let Some(token) = request.header(SESSION_HEADER) {
            return Some(token.trim());
        }

        request.header("cookie").and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == SESSION_COOKIE).then_some(value.trim())
            })
        })
    }

    fn is_valid_token(token: &str) -> bool {
        !token.is_empty()
            && token.len() <= MAX_TOKEN_LEN
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

#[async_trait]
impl IdentityResolver for SessionResolver {
    async fn resolve(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        match Self::extract_token(request) {
            Some(token) if Self::is_valid_token(token) => Ok(Identity::session(token)),
            Some(_) => Err(AuthError::InvalidCredentials(
                "Malformed session token".to_string(),
            )),
            None => Ok(Identity::mint_anonymous()),
        }
    }

    fn method_name(&self) -> &'static str {
        "session"
    }
}
