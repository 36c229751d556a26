//! Identity and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use mdraft_core::auth::SESSION_HEADER;
use mdraft_core::{AuthError, AuthRequest, Identity, IdentityKind};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::error::ApiError;
use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION, SESSIONS_MINTED_TOTAL,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Resolves the caller's [`Identity`] and stores it in the request
/// extensions.
///
/// A freshly minted anonymous key is echoed in the `X-Session-Id` response
/// header so the client can present it on later requests. Unknown API keys
/// and malformed session tokens are rejected with 401.
pub async fn identity_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    // Source IP is only known when served with connect info.
    let source_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let auth_request = AuthRequest { headers, source_ip };

    let identity = match state.resolver().resolve(&auth_request).await {
        Ok(identity) => identity,
        Err(e) => {
            let reason = match &e {
                AuthError::NotAuthenticated => "not_authenticated",
                AuthError::InvalidCredentials(_) => "invalid_credentials",
                _ => "internal_error",
            };
            AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
            debug!(%source_ip, reason, "Identity resolution failed");
            return ApiError::Auth(e).into_response();
        }
    };

    let minted = (identity.kind == IdentityKind::Anonymous).then(|| identity.key.clone());
    request.extensions_mut().insert(identity);

    let mut response = next.run(request).await;

    if let Some(key) = minted {
        SESSIONS_MINTED_TOTAL.inc();
        if let Ok(value) = HeaderValue::from_str(&key) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }

    response
}

/// Extractor for the identity resolved by [`identity_middleware`].
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Identity);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let identity = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CallerIdentity)
            .ok_or(ApiError::Auth(AuthError::NotAuthenticated));
        std::future::ready(identity)
    }
}
